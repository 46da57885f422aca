use tracing::info;

use crate::config::DEMO_SEEDED_KEY;
use crate::core::store::KvStore;
use crate::follow::follow_user;
use crate::posts::create_post;
use crate::users::{all_users, create_user, find_by_username, update_profile};

const DEMO_USERS: [(&str, &str, &[&str]); 3] = [
    ("test", "Test user", &["This is my first post on Murmur!"]),
    (
        "alice",
        "Hello, I'm Alice!",
        &[
            "Welcome to my corner! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    ),
    (
        "bob",
        "Bob's corner of the internet",
        &["Hey everyone! Just joined, looking forward to connecting with you all."],
    ),
];

/// Create the demo accounts (password = username) once per store.
pub fn seed_demo_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    if store.exists(DEMO_SEEDED_KEY)? {
        return Ok(());
    }

    let existing: Vec<String> = all_users(store)?.into_iter().map(|u| u.username).collect();

    for (username, about, posts) in DEMO_USERS {
        if existing.iter().any(|name| name == username) {
            continue;
        }
        let user = create_user(store, username, &format!("{}@example.com", username), username)?;
        update_profile(store, &user.id, username, Some(about.to_string()))?;

        for body in posts {
            create_post(store, &user.id, body)?;
        }
    }

    // "test" follows "bob"
    if let (Some(test), Some(bob)) = (find_by_username(store, "test")?, find_by_username(store, "bob")?) {
        follow_user(store, &test.id, &bob.id)?;
    }

    store.set_json(DEMO_SEEDED_KEY, &true)?;
    info!("demo data seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::follow::is_following;
    use crate::posts::followed_posts;

    #[test]
    fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();
        let entries = store.len();
        seed_demo_data(&store).unwrap();
        assert_eq!(store.len(), entries);
    }

    #[test]
    fn existing_accounts_are_left_alone() {
        let store = MemoryStore::new();
        let alice = create_user(&store, "alice", "alice@home.example", "own-password").unwrap();

        seed_demo_data(&store).unwrap();

        let stored = find_by_username(&store, "alice").unwrap().unwrap();
        assert_eq!(stored.id, alice.id);
        assert_eq!(stored.about_me, None);
        assert_eq!(all_users(&store).unwrap().len(), 3);
    }

    #[test]
    fn test_user_sees_bob_in_feed() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();

        let test = find_by_username(&store, "test").unwrap().unwrap();
        let bob = find_by_username(&store, "bob").unwrap().unwrap();
        assert!(is_following(&store, &test.id, &bob.id).unwrap());

        let feed = followed_posts(&store, &test, 1, 10).unwrap();
        let authors: Vec<_> = feed.items.iter().map(|v| v.author.username.as_str()).collect();
        assert_eq!(authors, vec!["bob", "test"]);
    }
}

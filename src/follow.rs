use spin_sdk::http::Request;
use tracing::info;

use crate::config::*;
use crate::core::errors::AppError;
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::forms::Fields;
use crate::models::models::{FlashCategory, Followers, Followings};
use crate::session::RequestContext;
use crate::templates::profile_url;
use crate::users;
use crate::AppState;

pub fn follow_user<S: KvStore>(store: &S, follower_id: &str, followed_id: &str) -> anyhow::Result<()> {
    store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
        if !followings.iter().any(|id| id == followed_id) {
            followings.push(followed_id.to_string());
        }
    })?;
    store.update_json(&followers_key(followed_id), |followers: &mut Followers| {
        if !followers.iter().any(|id| id == follower_id) {
            followers.push(follower_id.to_string());
        }
    })?;
    Ok(())
}

pub fn unfollow_user<S: KvStore>(store: &S, follower_id: &str, followed_id: &str) -> anyhow::Result<()> {
    if store.exists(&followings_key(follower_id))? {
        store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
            followings.retain(|id| id != followed_id)
        })?;
    }
    if store.exists(&followers_key(followed_id))? {
        store.update_json(&followers_key(followed_id), |followers: &mut Followers| {
            followers.retain(|id| id != follower_id)
        })?;
    }
    Ok(())
}

pub fn is_following<S: KvStore>(store: &S, follower_id: &str, followed_id: &str) -> anyhow::Result<bool> {
    Ok(get_followings(store, follower_id)?
        .iter()
        .any(|id| id == followed_id))
}

pub fn get_followings<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Followings> {
    Ok(store.get_json(&followings_key(user_id))?.unwrap_or_default())
}

pub fn get_followers<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Followers> {
    Ok(store.get_json(&followers_key(user_id))?.unwrap_or_default())
}

// === HTTP Handlers ===

#[derive(Clone, Copy)]
enum Action {
    Follow,
    Unfollow,
}

pub fn handle_follow<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    username: &str,
) -> Result<Reply, AppError> {
    change_relation(state, ctx, req, username, Action::Follow)
}

pub fn handle_unfollow<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    username: &str,
) -> Result<Reply, AppError> {
    change_relation(state, ctx, req, username, Action::Unfollow)
}

fn change_relation<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    username: &str,
    action: Action,
) -> Result<Reply, AppError> {
    let user = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    let fields = Fields::parse(req.body());
    if !ctx.verify_csrf(fields.get("csrf_token")) {
        ctx.flash(FlashCategory::Danger, "Something went wrong!");
        return Ok(Reply::redirect("/index"));
    }

    let target = match users::find_by_username(&state.store, username)? {
        Some(target) => target,
        None => {
            ctx.flash(FlashCategory::Danger, format!("User {} not found.", username));
            return Ok(Reply::redirect("/index"));
        }
    };

    if target.id == user.id {
        let message = match action {
            Action::Follow => "You cannot follow yourself!",
            Action::Unfollow => "You cannot unfollow yourself!",
        };
        ctx.flash(FlashCategory::Danger, message);
        return Ok(Reply::redirect(profile_url(username)));
    }

    match action {
        Action::Follow => {
            follow_user(&state.store, &user.id, &target.id)?;
            info!(follower = %user.username, followed = %target.username, "follow");
            ctx.flash(FlashCategory::Success, format!("You are now following {}.", username));
        }
        Action::Unfollow => {
            unfollow_user(&state.store, &user.id, &target.id)?;
            info!(follower = %user.username, followed = %target.username, "unfollow");
            ctx.flash(FlashCategory::Success, format!("You are no longer following {}.", username));
        }
    }

    Ok(Reply::redirect(profile_url(username)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    #[test]
    fn follow_is_directed_and_idempotent() {
        let store = MemoryStore::new();
        follow_user(&store, "john", "susan").unwrap();
        follow_user(&store, "john", "susan").unwrap();

        assert_eq!(get_followings(&store, "john").unwrap(), vec!["susan"]);
        assert_eq!(get_followers(&store, "susan").unwrap(), vec!["john"]);
        assert!(is_following(&store, "john", "susan").unwrap());
        assert!(!is_following(&store, "susan", "john").unwrap());
    }

    #[test]
    fn unfollow_removes_both_edges() {
        let store = MemoryStore::new();
        follow_user(&store, "john", "susan").unwrap();
        follow_user(&store, "mary", "susan").unwrap();

        unfollow_user(&store, "john", "susan").unwrap();

        assert!(get_followings(&store, "john").unwrap().is_empty());
        assert_eq!(get_followers(&store, "susan").unwrap(), vec!["mary"]);
    }

    #[test]
    fn unfollowing_a_stranger_is_a_no_op() {
        let store = MemoryStore::new();
        unfollow_user(&store, "john", "david").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_follows_keep_every_edge() {
        let store = MemoryStore::new();
        std::thread::scope(|scope| {
            for n in 0..16 {
                let store = &store;
                scope.spawn(move || follow_user(store, &format!("fan{}", n), "susan").unwrap());
            }
        });

        assert_eq!(get_followers(&store, "susan").unwrap().len(), 16);
    }
}

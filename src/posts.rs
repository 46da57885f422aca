use std::collections::{HashMap, HashSet};

use spin_sdk::http::{Method, Request};
use tracing::info;

use crate::config::*;
use crate::core::errors::AppError;
use crate::core::helpers::{new_id, now};
use crate::core::pagination::Paginated;
use crate::core::query_params::{get_int, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::follow::get_followings;
use crate::forms::{self, FormErrors, PostForm};
use crate::models::models::{FlashCategory, Post, PostView, User};
use crate::session::RequestContext;
use crate::templates::{self, FeedView};
use crate::users;
use crate::AppState;

pub fn create_post<S: KvStore>(store: &S, user_id: &str, body: &str) -> anyhow::Result<Post> {
    let post = Post {
        id: new_id(),
        user_id: user_id.to_string(),
        body: body.to_string(),
        created_at: now(),
    };

    store.set_json(&post_key(&post.id), &post)?;

    // Global timeline, newest first
    store.update_json(FEED_KEY, |feed: &mut Vec<String>| feed.insert(0, post.id.clone()))?;

    Ok(post)
}

/// Walk the global timeline (newest first) keeping posts by the given authors.
fn posts_by<S: KvStore>(store: &S, authors: &HashSet<String>) -> anyhow::Result<Vec<Post>> {
    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();

    let mut posts = Vec::new();
    for id in feed.iter() {
        if let Some(p) = store.get_json::<Post>(&post_key(id))? {
            if authors.contains(&p.user_id) {
                posts.push(p);
            }
        }
    }
    Ok(posts)
}

fn with_authors<S: KvStore>(store: &S, page: Paginated<Post>) -> anyhow::Result<Paginated<PostView>> {
    let mut authors: HashMap<String, User> = HashMap::new();
    page.try_map(|post| {
        let author = match authors.get(&post.user_id) {
            Some(author) => author.clone(),
            None => {
                let author = users::find_by_id(store, &post.user_id)?
                    .ok_or_else(|| anyhow::anyhow!("post {} has no author {}", post.id, post.user_id))?;
                authors.insert(author.id.clone(), author.clone());
                author
            }
        };
        Ok(PostView { post, author })
    })
}

/// Posts by the user and everyone they follow, newest first.
pub fn followed_posts<S: KvStore>(
    store: &S,
    user: &User,
    page: usize,
    per_page: usize,
) -> anyhow::Result<Paginated<PostView>> {
    let mut authors: HashSet<String> = get_followings(store, &user.id)?.into_iter().collect();
    authors.insert(user.id.clone());

    let posts = posts_by(store, &authors)?;
    with_authors(store, Paginated::paginate(posts, page, per_page))
}

pub fn user_posts<S: KvStore>(
    store: &S,
    user: &User,
    page: usize,
    per_page: usize,
) -> anyhow::Result<Paginated<PostView>> {
    let authors = HashSet::from([user.id.clone()]);
    let posts = posts_by(store, &authors)?;
    let page = Paginated::paginate(posts, page, per_page);

    // Every post here shares one author
    Ok(page.map(|post| PostView {
        post,
        author: user.clone(),
    }))
}

// === HTTP Handlers ===

pub fn index<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    let user = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    if let Method::Post = req.method() {
        let (form, errors) = forms::bind::<PostForm>(ctx, req);
        if errors.is_empty() {
            let post = create_post(&state.store, &user.id, &form.post)?;
            info!(user = %user.username, post_id = %post.id, "post created");
            ctx.flash(FlashCategory::Success, "Your post is now live!");
            return Ok(Reply::redirect("/index"));
        }
        return render_feed(state, ctx, req, &user, FeedView::home(form, errors));
    }

    render_feed(
        state,
        ctx,
        req,
        &user,
        FeedView::home(PostForm::default(), FormErrors::default()),
    )
}

pub fn explore<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    let user = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    if let Method::Post = req.method() {
        return Ok(Reply::redirect("/index"));
    }

    render_feed(state, ctx, req, &user, FeedView::explore())
}

fn render_feed<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    user: &User,
    mut view: FeedView,
) -> Result<Reply, AppError> {
    let params = parse_query_params(req.uri());
    let page = get_int(&params, "page", 1);
    view.posts = followed_posts(&state.store, user, page, state.config.posts_per_page)?;

    Ok(Reply::html(templates::feed_page(ctx, &view)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::follow::follow_user;

    #[test]
    fn followed_posts_include_own_and_followed_only() {
        let store = MemoryStore::new();
        let john = users::create_user(&store, "john", "john@example.com", "a").unwrap();
        let susan = users::create_user(&store, "susan", "susan@example.com", "b").unwrap();
        let mary = users::create_user(&store, "mary", "mary@example.com", "c").unwrap();

        create_post(&store, &john.id, "post from john").unwrap();
        create_post(&store, &susan.id, "post from susan").unwrap();
        create_post(&store, &mary.id, "post from mary").unwrap();
        follow_user(&store, &john.id, &susan.id).unwrap();

        let page = followed_posts(&store, &john, 1, 10).unwrap();
        let bodies: Vec<_> = page.items.iter().map(|v| v.post.body.as_str()).collect();
        assert_eq!(bodies, vec!["post from susan", "post from john"]);
        assert_eq!(page.items[0].author.username, "susan");
    }

    #[test]
    fn feeds_paginate_newest_first() {
        let store = MemoryStore::new();
        let john = users::create_user(&store, "john", "john@example.com", "a").unwrap();
        for n in 1..=5 {
            create_post(&store, &john.id, &format!("post {}", n)).unwrap();
        }

        let first = user_posts(&store, &john, 1, 2).unwrap();
        let bodies: Vec<_> = first.items.iter().map(|v| v.post.body.as_str()).collect();
        assert_eq!(bodies, vec!["post 5", "post 4"]);
        assert!(first.has_next());

        let last = user_posts(&store, &john, 3, 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].post.body, "post 1");
        assert!(!last.has_next());
    }

    #[test]
    fn concurrent_posts_all_reach_the_timeline() {
        let store = MemoryStore::new();
        let john = users::create_user(&store, "john", "john@example.com", "a").unwrap();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let (store, john) = (&store, &john);
                scope.spawn(move || {
                    for n in 0..50 {
                        create_post(store, &john.id, &format!("post {}-{}", t, n)).unwrap();
                    }
                });
            }
        });

        let feed: Vec<String> = store.get_json(FEED_KEY).unwrap().unwrap();
        assert_eq!(feed.len(), 400);
        assert_eq!(user_posts(&store, &john, 1, 500).unwrap().items.len(), 400);
    }
}

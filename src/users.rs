use anyhow::anyhow;
use spin_sdk::http::{Method, Request};
use thiserror::Error;
use tracing::info;

use crate::config::*;
use crate::core::errors::AppError;
use crate::core::helpers::{hash_password, new_id, now};
use crate::core::pagination::Paginated;
use crate::core::query_params::{get_int, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::follow;
use crate::forms::{self, EditProfileForm, FormErrors};
use crate::models::models::{FlashCategory, User};
use crate::posts;
use crate::session::RequestContext;
use crate::templates::{self, ProfileView};
use crate::AppState;

/// Names that collide with fixed routes under `/profile/`.
const RESERVED_USERNAMES: [&str; 1] = ["edit"];

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username {0} is already taken")]
    UsernameTaken(String),
    #[error("email {0} is already registered")]
    EmailTaken(String),
}

// === Storage ===

pub fn find_by_id<S: KvStore>(store: &S, id: &str) -> anyhow::Result<Option<User>> {
    store.get_json::<User>(&user_key(id))
}

pub fn find_by_username<S: KvStore>(store: &S, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_key(username))? {
        Some(id) => find_by_id(store, &id),
        None => Ok(None),
    }
}

/// Every registered user, in registration order.
pub fn all_users<S: KvStore>(store: &S) -> anyhow::Result<Vec<User>> {
    let ids: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut users = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(user) = find_by_id(store, id)? {
            users.push(user);
        }
    }
    Ok(users)
}

pub fn is_reserved(username: &str) -> bool {
    RESERVED_USERNAMES.contains(&username)
}

pub fn username_taken<S: KvStore>(store: &S, username: &str) -> anyhow::Result<bool> {
    Ok(is_reserved(username) || store.exists(&username_key(username))?)
}

pub fn email_taken<S: KvStore>(store: &S, email: &str) -> anyhow::Result<bool> {
    store.exists(&email_key(email))
}

fn claim_username<S: KvStore>(store: &S, username: &str, id: &str) -> anyhow::Result<()> {
    if is_reserved(username) || !store.claim_json(&username_key(username), &id)? {
        return Err(UserError::UsernameTaken(username.to_string()).into());
    }
    Ok(())
}

/// Claims the username and email indexes before writing the record, so
/// two sign-ups for the same name cannot both succeed.
pub fn create_user<S: KvStore>(
    store: &S,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<User> {
    let user = User {
        id: new_id(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        about_me: None,
        last_seen: None,
        created_at: now(),
    };

    claim_username(store, &user.username, &user.id)?;
    if !store.claim_json(&email_key(&user.email), &user.id)? {
        store.delete(&username_key(&user.username))?;
        return Err(UserError::EmailTaken(user.email).into());
    }

    store.set_json(&user_key(&user.id), &user)?;
    store.update_json(USERS_LIST_KEY, |ids: &mut Vec<String>| ids.push(user.id.clone()))?;

    Ok(user)
}

/// Change username and about-me on the stored record. The new name is
/// claimed before the old one is released.
pub fn update_profile<S: KvStore>(
    store: &S,
    user_id: &str,
    username: &str,
    about_me: Option<String>,
) -> anyhow::Result<User> {
    let current = find_by_id(store, user_id)?.ok_or_else(|| anyhow!("user {} not found", user_id))?;
    let renamed = current.username != username;
    if renamed {
        claim_username(store, username, user_id)?;
    }

    let updated = store.modify_json(&user_key(user_id), |user: &mut User| {
        user.username = username.to_string();
        user.about_me = about_me;
    })?;

    match updated {
        Some(user) => {
            if renamed {
                store.delete(&username_key(&current.username))?;
            }
            Ok(user)
        }
        None => {
            if renamed {
                store.delete(&username_key(username))?;
            }
            Err(anyhow!("user {} disappeared during update", user_id))
        }
    }
}

/// Stamp `last_seen` on the stored record and refresh `user` from it.
pub fn touch_last_seen<S: KvStore>(store: &S, user: &mut User) -> anyhow::Result<()> {
    let stamped = store.modify_json(&user_key(&user.id), |stored: &mut User| {
        stored.last_seen = Some(now());
    })?;
    if let Some(stamped) = stamped {
        *user = stamped;
    }
    Ok(())
}

fn is_username_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<UserError>(), Some(UserError::UsernameTaken(_)))
}

// === HTTP Handlers ===

pub fn profile<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    username: &str,
) -> Result<Reply, AppError> {
    let viewer = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    let user = find_by_username(&state.store, username)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found.", username)))?;

    let params = parse_query_params(req.uri());
    let page = get_int(&params, "page", 1);
    let posts: Paginated<_> =
        posts::user_posts(&state.store, &user, page, state.config.posts_per_page)?;

    let view = ProfileView {
        is_self: viewer.id == user.id,
        is_following: follow::is_following(&state.store, &viewer.id, &user.id)?,
        followers: follow::get_followers(&state.store, &user.id)?.len(),
        following: follow::get_followings(&state.store, &user.id)?.len(),
        user,
        posts,
    };

    Ok(Reply::html(templates::profile_page(ctx, &view)?))
}

pub fn edit_profile<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    let user = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    if let Method::Get = req.method() {
        let form = EditProfileForm {
            username: user.username.clone(),
            about_me: user.about_me.clone().unwrap_or_default(),
        };
        return Ok(Reply::html(templates::edit_profile_page(ctx, &form, &FormErrors::default())?));
    }

    let (form, mut errors) = forms::bind::<EditProfileForm>(ctx, req);
    if !errors.has("username")
        && form.username != user.username
        && username_taken(&state.store, &form.username)?
    {
        errors.add("username", forms::USERNAME_TAKEN);
    }

    if errors.is_empty() {
        let about_me = Some(form.about_me.clone()).filter(|about| !about.trim().is_empty());
        match update_profile(&state.store, &user.id, &form.username, about_me) {
            Ok(updated) => {
                if updated.username != user.username {
                    info!(user_id = %user.id, from = %user.username, to = %updated.username, "username changed");
                }
                let location = templates::profile_url(&updated.username);
                ctx.user = Some(updated);
                ctx.flash(FlashCategory::Success, "Profile Updated Successfully!");
                return Ok(Reply::redirect(location));
            }
            Err(err) if is_username_conflict(&err) => errors.add("username", forms::USERNAME_TAKEN),
            Err(err) => return Err(err.into()),
        }
    }

    ctx.flash(FlashCategory::Danger, "Profile Update Failed!");
    Ok(Reply::html(templates::edit_profile_page(ctx, &form, &errors)?))
}

pub(crate) fn registration_conflict(err: &anyhow::Error) -> Option<(&'static str, &'static str)> {
    match err.downcast_ref::<UserError>()? {
        UserError::UsernameTaken(_) => Some(("username", forms::USERNAME_TAKEN)),
        UserError::EmailTaken(_) => Some(("email", forms::EMAIL_TAKEN)),
    }
}

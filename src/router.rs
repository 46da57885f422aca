use spin_sdk::http::{Method, Request, Response};
use tracing::{error, warn};

use crate::auth;
use crate::core::errors::AppError;
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::follow;
use crate::posts;
use crate::session::RequestContext;
use crate::static_server::serve_static;
use crate::templates;
use crate::users;
use crate::AppState;

/// The reply for one request plus the session cookie to hand back, if any.
pub struct Outcome {
    pub reply: Reply,
    pub set_cookie: Option<String>,
}

impl Outcome {
    pub fn into_response(self) -> Response {
        self.reply.into_response(self.set_cookie)
    }
}

pub fn handle<S: KvStore>(state: &AppState<S>, req: &Request) -> Response {
    dispatch(state, req).into_response()
}

pub fn dispatch<S: KvStore>(state: &AppState<S>, req: &Request) -> Outcome {
    let path = req.path().to_string();

    if path.starts_with("/static/") {
        let reply = match req.method() {
            Method::Get | Method::Head => serve_static(&path),
            _ => Err(AppError::MethodNotAllowed),
        };
        return Outcome {
            reply: reply.unwrap_or_else(|err| bare_error(&err)),
            set_cookie: None,
        };
    }

    let mut ctx = match RequestContext::load(state, req) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, path = %path, "session lookup failed");
            return Outcome {
                reply: bare_error(&AppError::Internal(err)),
                set_cookie: None,
            };
        }
    };

    if let Some(user) = ctx.user.as_mut() {
        if let Err(err) = users::touch_last_seen(&state.store, user) {
            warn!(error = %err, user_id = %user.id, "could not record last_seen");
        }
    }

    let reply = match route(state, &mut ctx, req, &path) {
        Ok(reply) => reply,
        Err(err) => render_error(&mut ctx, err, &path),
    };

    let set_cookie = match ctx.save(state) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!(error = %err, "failed to persist session");
            None
        }
    };

    Outcome { reply, set_cookie }
}

fn route<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
    path: &str,
) -> Result<Reply, AppError> {
    match (req.method(), path) {
        (Method::Get | Method::Post, "/" | "/index") => posts::index(state, ctx, req),
        (Method::Get | Method::Post, "/explore") => posts::explore(state, ctx, req),
        (Method::Get | Method::Post, "/register") => auth::register(state, ctx, req),
        (Method::Get | Method::Post, "/login") => auth::login(state, ctx, req),
        (Method::Get, "/logout") => auth::logout(state, ctx, req),
        (Method::Get | Method::Post, "/profile/edit") => users::edit_profile(state, ctx, req),
        (Method::Get, p) if p.starts_with("/profile/") => {
            let username = segment(p, "/profile/")?;
            users::profile(state, ctx, req, &username)
        }
        (Method::Post, p) if p.starts_with("/follow/") => {
            let username = segment(p, "/follow/")?;
            follow::handle_follow(state, ctx, req, &username)
        }
        (Method::Post, p) if p.starts_with("/unfollow/") => {
            let username = segment(p, "/unfollow/")?;
            follow::handle_unfollow(state, ctx, req, &username)
        }
        (_, p) if is_known_route(p) => Err(AppError::MethodNotAllowed),
        _ => Err(AppError::NotFound(
            "The requested URL was not found on the server.".to_string(),
        )),
    }
}

/// The single decoded path segment after `prefix`.
fn segment(path: &str, prefix: &str) -> Result<String, AppError> {
    let raw = path.trim_start_matches(prefix);
    if raw.is_empty() || raw.contains('/') {
        return Err(AppError::NotFound(
            "The requested URL was not found on the server.".to_string(),
        ));
    }
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| AppError::NotFound("The requested URL was not found on the server.".to_string()))
}

fn is_known_route(path: &str) -> bool {
    matches!(
        path,
        "/" | "/index" | "/explore" | "/register" | "/login" | "/logout" | "/profile/edit"
    ) || ["/profile/", "/follow/", "/unfollow/"]
        .iter()
        .any(|prefix| path.starts_with(prefix) && path.len() > prefix.len())
}

fn render_error(ctx: &mut RequestContext, err: AppError, path: &str) -> Reply {
    if let AppError::Internal(inner) = &err {
        error!(error = %inner, path = %path, "request failed");
    }

    match templates::error_page(ctx, err.status(), &err.public_message()) {
        Ok(page) => Reply::html_with_status(err.status(), page),
        Err(render_err) => {
            error!(error = %render_err, "error page failed to render");
            bare_error(&err)
        }
    }
}

/// Error reply that needs neither a session nor a template.
fn bare_error(err: &AppError) -> Reply {
    Reply::html_with_status(
        err.status(),
        format!(
            "<!doctype html>\n<title>{}</title>\n<p>{}</p>\n",
            err.status(),
            html_escape::encode_text(&err.public_message())
        ),
    )
}

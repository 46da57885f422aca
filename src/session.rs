//! Cookie-addressed server-side sessions.
//!
//! A session record holds the logged-in user (if any), the CSRF token
//! embedded in forms, and pending flash messages. Records are only written
//! once there is something to keep. Logging in or out rotates the token so a
//! pre-login cookie never becomes privileged.

use chrono::Duration;
use cookie::{Cookie, SameSite};
use spin_sdk::http::Request;
use tracing::warn;

use crate::config::*;
use crate::core::helpers::{constant_time_eq, now, random_token};
use crate::core::query_params::query_string;
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::models::models::{Flash, FlashCategory, Session, User};
use crate::users;
use crate::AppState;

const CSRF_TOKEN_LENGTH: usize = 40;

pub struct RequestContext {
    pub session: Session,
    pub user: Option<User>,
    /// The record exists in the store under `session.token`.
    stored: bool,
    issue_cookie: bool,
    dirty: bool,
    retired_token: Option<String>,
}

impl RequestContext {
    /// Resolve the session named by the request cookie, or start a new one.
    pub fn load<S: KvStore>(state: &AppState<S>, req: &Request) -> anyhow::Result<Self> {
        let cookie = req
            .header("cookie")
            .and_then(|h| h.as_str())
            .and_then(|h| cookie_value(h, SESSION_COOKIE));

        if let Some(token) = cookie {
            if let Some(session) = state.store.get_json::<Session>(&session_key(&token))? {
                if !is_expired(&session, &state.config) {
                    return Self::resume(state, session);
                }
                state.store.delete(&session_key(&token))?;
            }
        }

        Ok(Self::fresh())
    }

    fn resume<S: KvStore>(state: &AppState<S>, mut session: Session) -> anyhow::Result<Self> {
        let mut dirty = false;
        let user = match session.user_id.as_deref() {
            Some(id) => {
                let user = users::find_by_id(&state.store, id)?;
                if user.is_none() {
                    session.user_id = None;
                    dirty = true;
                }
                user
            }
            None => None,
        };

        Ok(Self {
            session,
            user,
            stored: true,
            issue_cookie: false,
            dirty,
            retired_token: None,
        })
    }

    fn fresh() -> Self {
        Self {
            session: new_session(),
            user: None,
            stored: false,
            issue_cookie: false,
            dirty: false,
            retired_token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The token for a rendered form. Handing it out keeps the session.
    pub fn csrf_token(&mut self) -> &str {
        self.keep();
        &self.session.csrf_token
    }

    pub fn verify_csrf(&self, submitted: Option<&str>) -> bool {
        match submitted {
            Some(token) if !token.is_empty() => constant_time_eq(token, &self.session.csrf_token),
            _ => false,
        }
    }

    pub fn flash(&mut self, category: FlashCategory, message: impl Into<String>) {
        self.session.flashes.push(Flash {
            category,
            message: message.into(),
        });
        self.keep();
    }

    pub fn take_flashes(&mut self) -> Vec<Flash> {
        if !self.session.flashes.is_empty() {
            self.dirty = true;
        }
        std::mem::take(&mut self.session.flashes)
    }

    pub fn login(&mut self, user: User, remember: bool) {
        self.rotate();
        self.session.user_id = Some(user.id.clone());
        self.session.remember = remember;
        self.user = Some(user);
    }

    pub fn logout(&mut self) {
        self.rotate();
        self.session.user_id = None;
        self.session.remember = false;
        self.user = None;
    }

    fn rotate(&mut self) {
        let flashes = std::mem::take(&mut self.session.flashes);
        let old = std::mem::replace(&mut self.session, new_session());
        self.session.flashes = flashes;
        if self.stored {
            self.retired_token = Some(old.token);
        }
        self.stored = false;
        self.keep();
    }

    /// Mark the session as worth persisting; a new one also needs a cookie.
    fn keep(&mut self) {
        self.dirty = true;
        if !self.stored {
            self.issue_cookie = true;
        }
    }

    /// Redirect to the login page, remembering where the visitor wanted to go.
    pub fn login_required(&mut self, req: &Request) -> Reply {
        self.flash(FlashCategory::Info, "Please log in to access this page.");

        let mut next = req.path().to_string();
        if let Some(query) = query_string(req.uri()).filter(|q| !q.is_empty()) {
            next.push('?');
            next.push_str(query);
        }
        Reply::redirect(format!("/login?next={}", urlencoding::encode(&next)))
    }

    /// Persist pending changes; returns the `Set-Cookie` value when the
    /// browser needs a new token.
    ///
    /// The new record is written before a rotated-out one is removed, so a
    /// failed write leaves the previous session usable.
    pub fn save<S: KvStore>(&mut self, state: &AppState<S>) -> anyhow::Result<Option<String>> {
        if self.dirty {
            state
                .store
                .set_json(&session_key(&self.session.token), &self.session)?;
            self.dirty = false;
            self.stored = true;
        }
        if let Some(token) = self.retired_token.take() {
            if let Err(err) = state.store.delete(&session_key(&token)) {
                warn!(error = %err, "could not remove rotated session");
            }
        }
        if !self.issue_cookie {
            return Ok(None);
        }
        self.issue_cookie = false;
        Ok(Some(session_cookie(&self.session, &state.config)))
    }
}

fn new_session() -> Session {
    Session {
        token: uuid::Uuid::new_v4().to_string(),
        user_id: None,
        csrf_token: random_token(CSRF_TOKEN_LENGTH),
        remember: false,
        flashes: Vec::new(),
        created_at: now(),
    }
}

fn lifetime(session: &Session, config: &Config) -> Duration {
    if session.remember {
        Duration::days(config.remember_me_days)
    } else {
        Duration::hours(config.session_expiration_hours)
    }
}

pub fn is_expired(session: &Session, config: &Config) -> bool {
    now() - session.created_at > lifetime(session, config)
}

pub fn session_cookie(session: &Session, config: &Config) -> String {
    let mut builder = Cookie::build((SESSION_COOKIE, session.token.as_str()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies);
    if session.remember {
        let max_age = cookie::time::Duration::seconds(lifetime(session, config).num_seconds());
        builder = builder.max_age(max_age);
    }
    builder.build().to_string()
}

/// Pull one cookie out of a `Cookie:` header.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_string())
        .filter(|value| !value.is_empty())
}

/// Only same-site absolute paths are acceptable redirect targets after login.
pub fn is_safe_next(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.starts_with("/\\")
        && !next.chars().any(|c| c.is_control())
}

use spin_sdk::http::{Method, Request};
use tracing::{info, warn};

use crate::core::errors::AppError;
use crate::core::helpers::verify_password;
use crate::core::query_params::{get_string, parse_query_params};
use crate::core::reply::Reply;
use crate::core::store::KvStore;
use crate::forms::{self, FormErrors, LoginForm, RegistrationForm};
use crate::models::models::FlashCategory;
use crate::session::{is_safe_next, RequestContext};
use crate::templates;
use crate::users;
use crate::AppState;

pub fn register<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    if ctx.is_authenticated() {
        return Ok(Reply::redirect("/index"));
    }

    if let Method::Get = req.method() {
        let page = templates::register_page(ctx, &RegistrationForm::default(), &FormErrors::default())?;
        return Ok(Reply::html(page));
    }

    let (form, mut errors) = forms::bind::<RegistrationForm>(ctx, req);
    if !errors.has("username") && users::username_taken(&state.store, &form.username)? {
        errors.add("username", forms::USERNAME_TAKEN);
    }
    if !errors.has("email") && users::email_taken(&state.store, &form.email)? {
        errors.add("email", forms::EMAIL_TAKEN);
    }

    if errors.is_empty() {
        match users::create_user(&state.store, &form.username, &form.email, &form.password) {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "user registered");
                ctx.flash(FlashCategory::Success, "Registration Successful!");
                return Ok(Reply::redirect("/login"));
            }
            Err(err) => match users::registration_conflict(&err) {
                Some((field, message)) => {
                    warn!(username = %form.username, "registration lost a race for {}", field);
                    errors.add(field, message);
                }
                None => return Err(err.into()),
            },
        }
    }

    ctx.flash(FlashCategory::Danger, "Failed to register! Check for error messages!");
    Ok(Reply::html(templates::register_page(ctx, &form, &errors)?))
}

pub fn login<S: KvStore>(
    state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    let params = parse_query_params(req.uri());
    let next = get_string(&params, "next");

    if let Method::Get = req.method() {
        if ctx.is_authenticated() {
            ctx.flash(FlashCategory::Primary, "You have already logged in!");
            return Ok(Reply::redirect("/index"));
        }
        let page = templates::login_page(ctx, &LoginForm::default(), &FormErrors::default(), next.as_deref())?;
        return Ok(Reply::html(page));
    }

    let retry = match next.as_deref() {
        Some(next) => format!("/login?next={}", urlencoding::encode(next)),
        None => "/login".to_string(),
    };

    let (form, errors) = forms::bind::<LoginForm>(ctx, req);
    if !errors.is_empty() {
        ctx.flash(FlashCategory::Danger, "Invalid Username or password!");
        return Ok(Reply::redirect(retry));
    }

    let user = match users::find_by_username(&state.store, &form.username)? {
        Some(user) if verify_password(&form.password, &user.password_hash) => user,
        _ => {
            warn!(username = %form.username, "failed login");
            ctx.flash(FlashCategory::Danger, "Invalid Username or password!");
            return Ok(Reply::redirect(retry));
        }
    };

    info!(user_id = %user.id, username = %user.username, remember = form.remember_me, "user logged in");
    ctx.login(user, form.remember_me);
    ctx.flash(FlashCategory::Success, "Login Successful!");

    match next {
        Some(next) if is_safe_next(&next) => Ok(Reply::redirect(next)),
        _ => Ok(Reply::redirect("/index")),
    }
}

pub fn logout<S: KvStore>(
    _state: &AppState<S>,
    ctx: &mut RequestContext,
    req: &Request,
) -> Result<Reply, AppError> {
    let user = match ctx.user.clone() {
        Some(user) => user,
        None => return Ok(ctx.login_required(req)),
    };

    info!(user_id = %user.id, username = %user.username, "user logged out");
    ctx.logout();
    Ok(Reply::redirect("/login"))
}

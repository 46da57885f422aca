use std::sync::OnceLock;

use ammonia::Builder;
use html_escape::{encode_double_quoted_attribute, encode_text};
use http::StatusCode;
use regex::Regex;
use rust_embed::RustEmbed;

use crate::core::pagination::Paginated;
use crate::forms::{EditProfileForm, FormErrors, LoginForm, PostForm, RegistrationForm};
use crate::models::models::{PostView, User};
use crate::session::RequestContext;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Pages;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

pub struct FeedView {
    pub title: &'static str,
    pub base_url: &'static str,
    pub form: Option<(PostForm, FormErrors)>,
    pub posts: Paginated<PostView>,
}

impl FeedView {
    pub fn home(form: PostForm, errors: FormErrors) -> Self {
        Self {
            title: "Home",
            base_url: "/index",
            form: Some((form, errors)),
            posts: Paginated::paginate(Vec::new(), 1, 1),
        }
    }

    pub fn explore() -> Self {
        Self {
            title: "Explore",
            base_url: "/explore",
            form: None,
            posts: Paginated::paginate(Vec::new(), 1, 1),
        }
    }
}

pub struct ProfileView {
    pub user: User,
    pub posts: Paginated<PostView>,
    pub is_self: bool,
    pub is_following: bool,
    pub followers: usize,
    pub following: usize,
}

fn load(name: &str) -> anyhow::Result<String> {
    let file = Pages::get(name).ok_or_else(|| anyhow::anyhow!("template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

/// Substitute `{{name}}` placeholders in one pass, so substituted values are
/// never scanned again. Unknown names render empty.
pub fn fill(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some((_, value)) = vars.iter().find(|(key, _)| *key == name) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}", urlencoding::encode(username))
}

fn attr(value: &str) -> String {
    encode_double_quoted_attribute(value).to_string()
}

fn text(value: &str) -> String {
    encode_text(value).to_string()
}

fn field_error(errors: &FormErrors, field: &str) -> String {
    errors
        .get(field)
        .map(|msg| format!(r#"<span class="field-error">{}</span>"#, text(msg)))
        .unwrap_or_default()
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile"))
}

/// Escape a post body and turn http(s) URLs into links.
pub fn render_post_body(body: &str) -> String {
    let escaped = text(body);
    let linked = url_regex().replace_all(&escaped, |caps: &regex::Captures| {
        let url = &caps[0];
        format!(r#"<a href="{}">{}</a>"#, url, url)
    });

    Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(&linked)
        .to_string()
}

fn nav(user: Option<&User>) -> String {
    match user {
        Some(user) => format!(
            r#"<a href="/index">Home</a><a href="/explore">Explore</a><a href="{}">Profile</a><a href="/logout">Logout</a>"#,
            attr(&profile_url(&user.username))
        ),
        None => r#"<a href="/login">Login</a><a href="/register">Register</a>"#.to_string(),
    }
}

fn layout(ctx: &mut RequestContext, title: &str, content: String) -> anyhow::Result<String> {
    let flashes: String = ctx
        .take_flashes()
        .iter()
        .map(|flash| {
            format!(
                r#"<div class="alert alert-{}" role="alert">{}</div>"#,
                flash.category.as_str(),
                text(&flash.message)
            )
        })
        .collect::<Vec<_>>()
        .join("\n    ");

    Ok(fill(
        &load("base.html")?,
        &[
            ("title", text(title)),
            ("nav", nav(ctx.user.as_ref())),
            ("flashes", flashes),
            ("content", content),
        ],
    ))
}

fn post_list(posts: &Paginated<PostView>) -> String {
    if posts.items.is_empty() {
        return r#"<p class="empty">No posts to show.</p>"#.to_string();
    }

    posts
        .items
        .iter()
        .map(|view| {
            format!(
                r#"<article class="post">
  <p class="meta"><a href="{}">{}</a> said <time datetime="{}">{}</time>:</p>
  <p class="body">{}</p>
</article>"#,
                attr(&profile_url(&view.author.username)),
                text(&view.author.username),
                view.post.created_at.to_rfc3339(),
                view.post.created_at.format(TIME_FORMAT),
                render_post_body(&view.post.body)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pager<T>(page: &Paginated<T>, base_url: &str) -> String {
    if !page.has_prev() && !page.has_next() {
        return String::new();
    }

    let newer = page
        .prev_num()
        .map(|n| format!(r#"<a class="newer" href="{}?page={}">&larr; Newer posts</a>"#, attr(base_url), n))
        .unwrap_or_else(|| "<span></span>".to_string());
    let older = page
        .next_num()
        .map(|n| format!(r#"<a class="older" href="{}?page={}">Older posts &rarr;</a>"#, attr(base_url), n))
        .unwrap_or_else(|| "<span></span>".to_string());

    let position = if page.page <= page.pages() {
        format!(r#"<span class="page-of">Page {} of {}</span>"#, page.page, page.pages())
    } else {
        String::new()
    };

    format!(r#"<nav class="pager">{}{}{}</nav>"#, newer, position, older)
}

// === Pages ===

pub fn login_page(
    ctx: &mut RequestContext,
    form: &LoginForm,
    errors: &FormErrors,
    next: Option<&str>,
) -> anyhow::Result<String> {
    let action = match next {
        Some(next) => format!("/login?next={}", urlencoding::encode(next)),
        None => "/login".to_string(),
    };
    let content = fill(
        &load("login.html")?,
        &[
            ("action", attr(&action)),
            ("csrf_token", attr(ctx.csrf_token())),
            ("csrf_error", field_error(errors, "csrf_token")),
            ("username", attr(&form.username)),
            ("username_error", field_error(errors, "username")),
            ("password_error", field_error(errors, "password")),
            (
                "remember_checked",
                if form.remember_me { " checked".to_string() } else { String::new() },
            ),
        ],
    );
    layout(ctx, "Sign In", content)
}

pub fn register_page(
    ctx: &mut RequestContext,
    form: &RegistrationForm,
    errors: &FormErrors,
) -> anyhow::Result<String> {
    let content = fill(
        &load("register.html")?,
        &[
            ("csrf_token", attr(ctx.csrf_token())),
            ("csrf_error", field_error(errors, "csrf_token")),
            ("username", attr(&form.username)),
            ("username_error", field_error(errors, "username")),
            ("email", attr(&form.email)),
            ("email_error", field_error(errors, "email")),
            ("password_error", field_error(errors, "password")),
            ("password2_error", field_error(errors, "password2")),
        ],
    );
    layout(ctx, "Register", content)
}

pub fn edit_profile_page(
    ctx: &mut RequestContext,
    form: &EditProfileForm,
    errors: &FormErrors,
) -> anyhow::Result<String> {
    let content = fill(
        &load("edit_profile.html")?,
        &[
            ("csrf_token", attr(ctx.csrf_token())),
            ("csrf_error", field_error(errors, "csrf_token")),
            ("username", attr(&form.username)),
            ("username_error", field_error(errors, "username")),
            ("about_me", text(&form.about_me)),
            ("about_me_error", field_error(errors, "about_me")),
        ],
    );
    layout(ctx, "Edit Profile", content)
}

pub fn feed_page(ctx: &mut RequestContext, view: &FeedView) -> anyhow::Result<String> {
    let post_form = match &view.form {
        Some((form, errors)) => fill(
            &load("post_form.html")?,
            &[
                ("csrf_token", attr(ctx.csrf_token())),
                ("csrf_error", field_error(errors, "csrf_token")),
                ("post", text(&form.post)),
                ("post_error", field_error(errors, "post")),
            ],
        ),
        None => String::new(),
    };

    let heading = match (&view.form, ctx.user.as_ref()) {
        (Some(_), Some(user)) => format!("Hi, {}!", user.username),
        _ => view.title.to_string(),
    };

    let content = fill(
        &load("feed.html")?,
        &[
            ("heading", text(&heading)),
            ("post_form", post_form),
            ("posts", post_list(&view.posts)),
            ("pager", pager(&view.posts, view.base_url)),
        ],
    );
    layout(ctx, view.title, content)
}

pub fn profile_page(ctx: &mut RequestContext, view: &ProfileView) -> anyhow::Result<String> {
    let user = &view.user;
    let profile = profile_url(&user.username);

    let actions = if view.is_self {
        r#"<p><a href="/profile/edit">Edit your profile</a></p>"#.to_string()
    } else {
        let (action, label) = if view.is_following {
            ("unfollow", "Unfollow")
        } else {
            ("follow", "Follow")
        };
        format!(
            r#"<form action="/{}/{}" method="post" class="follow-form">
    <input type="hidden" name="csrf_token" value="{}">
    <button class="btn btn-primary" type="submit">{}</button>
  </form>"#,
            action,
            attr(&urlencoding::encode(&user.username)),
            attr(ctx.csrf_token()),
            label
        )
    };

    let about_me = user
        .about_me
        .as_deref()
        .map(|about| format!(r#"<p class="about">{}</p>"#, text(about)))
        .unwrap_or_default();
    let last_seen = user
        .last_seen
        .map(|seen| format!(r#"<p class="last-seen">Last seen on: {}</p>"#, seen.format(TIME_FORMAT)))
        .unwrap_or_default();

    let content = fill(
        &load("profile.html")?,
        &[
            ("username", text(&user.username)),
            ("about_me", about_me),
            ("last_seen", last_seen),
            ("followers", view.followers.to_string()),
            ("following", view.following.to_string()),
            ("actions", actions),
            ("posts", post_list(&view.posts)),
            ("pager", pager(&view.posts, &profile)),
        ],
    );
    layout(ctx, "Profile", content)
}

pub fn error_page(ctx: &mut RequestContext, status: StatusCode, message: &str) -> anyhow::Result<String> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let content = fill(
        &load("error.html")?,
        &[
            ("status", format!("{} {}", status.as_u16(), reason)),
            ("message", text(message)),
        ],
    );
    layout(ctx, reason, content)
}

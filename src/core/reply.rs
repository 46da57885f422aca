use http::StatusCode;
use spin_sdk::http::Response;

const HTML: &str = "text/html; charset=utf-8";

/// What a handler wants sent back, before session cookies are attached.
#[derive(Debug)]
pub enum Reply {
    Html { status: StatusCode, body: String },
    Redirect { location: String },
    Asset { content_type: String, body: Vec<u8> },
}

/// A reply flattened into the pieces every HTTP frontend needs.
pub struct ReplyParts {
    pub status: u16,
    pub content_type: String,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn html(body: String) -> Self {
        Reply::Html {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn html_with_status(status: StatusCode, body: String) -> Self {
        Reply::Html { status, body }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::Redirect {
            location: location.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Html { status, .. } => *status,
            Reply::Redirect { .. } => StatusCode::FOUND,
            Reply::Asset { .. } => StatusCode::OK,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Reply::Redirect { location } => Some(location),
            _ => None,
        }
    }

    pub fn body_text(&self) -> String {
        match self {
            Reply::Html { body, .. } => body.clone(),
            Reply::Redirect { location } => redirect_body(location),
            Reply::Asset { body, .. } => String::from_utf8_lossy(body).into_owned(),
        }
    }

    pub fn into_parts(self) -> ReplyParts {
        match self {
            Reply::Html { status, body } => ReplyParts {
                status: status.as_u16(),
                content_type: HTML.to_string(),
                location: None,
                body: body.into_bytes(),
            },
            Reply::Redirect { location } => ReplyParts {
                status: StatusCode::FOUND.as_u16(),
                content_type: HTML.to_string(),
                body: redirect_body(&location).into_bytes(),
                location: Some(location),
            },
            Reply::Asset { content_type, body } => ReplyParts {
                status: StatusCode::OK.as_u16(),
                content_type,
                location: None,
                body,
            },
        }
    }

    pub fn into_response(self, set_cookie: Option<String>) -> Response {
        let parts = self.into_parts();

        let mut builder = Response::builder();
        builder
            .status(parts.status)
            .header("content-type", parts.content_type);
        if let Some(location) = parts.location {
            builder.header("location", location);
        }
        if let Some(cookie) = set_cookie {
            builder.header("set-cookie", cookie);
        }
        builder.body(parts.body).build()
    }
}

fn redirect_body(location: &str) -> String {
    let escaped = html_escape::encode_double_quoted_attribute(location);
    format!(
        "<!doctype html>\n<title>Redirecting...</title>\n<p>Redirecting to <a href=\"{}\">{}</a>.</p>\n",
        escaped, escaped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_are_found_with_location() {
        let reply = Reply::redirect("/login?next=%2Findex");
        assert_eq!(reply.status(), StatusCode::FOUND);
        assert_eq!(reply.location(), Some("/login?next=%2Findex"));

        let parts = reply.into_parts();
        assert_eq!(parts.status, 302);
        assert_eq!(parts.location.as_deref(), Some("/login?next=%2Findex"));
        assert!(String::from_utf8(parts.body).unwrap().contains("Redirecting"));
    }

    #[test]
    fn html_is_served_as_utf8() {
        let parts = Reply::html("<p>hi</p>".to_string()).into_parts();
        assert_eq!(parts.status, 200);
        assert_eq!(parts.content_type, "text/html; charset=utf-8");
    }
}

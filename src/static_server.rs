use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::core::errors::AppError;
use crate::core::reply::Reply;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

pub fn serve_static(path: &str) -> Result<Reply, AppError> {
    let file_path = path.trim_start_matches("/static/");

    let file = Assets::get(file_path)
        .ok_or_else(|| AppError::NotFound(format!("{} not found.", path)))?;

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(Reply::Asset {
        content_type: mime.as_ref().to_string(),
        body: file.data.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_the_stylesheet_as_css() {
        match serve_static("/static/style.css").unwrap() {
            Reply::Asset { content_type, body } => {
                assert_eq!(content_type, "text/css");
                assert!(!body.is_empty());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn unknown_assets_are_not_found() {
        assert!(matches!(
            serve_static("/static/nope.js"),
            Err(AppError::NotFound(_))
        ));
    }
}

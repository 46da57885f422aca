use murmur::config::Config;
use murmur::core::store::MemoryStore;
use murmur::AppState;
use regex::Regex;

async fn spawn_app() -> String {
    let state = AppState::new(MemoryStore::new(), Config::default());
    let (server, addrs) = murmur::server::listen(state, "127.0.0.1:0").expect("Failed to bind");
    tokio::spawn(server);
    format!("http://{}", addrs[0])
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build client")
}

fn session_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string())
}

fn csrf_token(html: &str) -> String {
    let re = Regex::new(r#"name="csrf_token" value="([^"]+)""#).unwrap();
    re.captures(html).expect("csrf token missing")[1].to_string()
}

#[tokio::test]
async fn test_register_login_and_post_over_http() {
    let base = spawn_app().await;
    let client = client();

    // 1. Fetch the registration form
    let resp = client
        .get(format!("{}/register", base))
        .send()
        .await
        .expect("Failed to fetch form");
    assert_eq!(resp.status(), 200);
    let mut cookie = session_cookie(&resp).expect("session cookie missing");
    let token = csrf_token(&resp.text().await.unwrap());

    // 2. Register
    let username = format!("flow_test_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let email = format!("{}@example.com", username);
    let resp = client
        .post(format!("{}/register", base))
        .header("cookie", &cookie)
        .form(&[
            ("username", username.as_str()),
            ("email", email.as_str()),
            ("password", "test"),
            ("password2", "test"),
            ("csrf_token", token.as_str()),
        ])
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers()["location"], "/login");

    // 3. Login
    let resp = client
        .post(format!("{}/login", base))
        .header("cookie", &cookie)
        .form(&[
            ("username", username.as_str()),
            ("password", "test"),
            ("csrf_token", token.as_str()),
        ])
        .send()
        .await
        .expect("Failed to login");
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers()["location"], "/index");
    cookie = session_cookie(&resp).expect("login must rotate the session");

    // 4. Post from the home page
    let resp = client
        .get(format!("{}/index", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let home = resp.text().await.unwrap();
    assert!(home.contains("Login Successful!"));
    let token = csrf_token(&home);

    let resp = client
        .post(format!("{}/index", base))
        .header("cookie", &cookie)
        .form(&[("post", "Test post from integration test!"), ("csrf_token", token.as_str())])
        .send()
        .await
        .expect("Failed to create post");
    assert_eq!(resp.status(), 302);

    let home = client
        .get(format!("{}/index", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(home.contains("Your post is now live!"));
    assert!(home.contains("Test post from integration test!"));
}

#[tokio::test]
async fn test_create_post_requires_auth() {
    let base = spawn_app().await;

    let resp = client()
        .post(format!("{}/index", base))
        .form(&[("post", "Test post without auth")])
        .send()
        .await
        .expect("Failed to make request");

    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers()["location"], "/login?next=%2Findex");
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let base = spawn_app().await;

    let resp = client()
        .get(format!("{}/static/style.css", base))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/css");
    assert!(resp.headers().get("set-cookie").is_none());
}

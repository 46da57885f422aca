//! Native HTTP frontend: actix-web in front of the same router the Spin
//! component uses, backed by an in-process [`MemoryStore`].

use std::net::SocketAddr;

use actix_web::dev::Server;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

use crate::core::store::MemoryStore;
use crate::router;
use crate::AppState;

mod adapter {
    use actix_web::http::StatusCode;
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request};

    use crate::router::Outcome;

    pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        };

        let mut builder = Request::builder();
        builder.method(method).uri(req.uri().to_string());
        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                builder.header(name.as_str(), val_str);
            }
        }
        builder.body(body.to_vec()).build()
    }

    pub fn outcome_to_actix(outcome: Outcome) -> actix_web::HttpResponse {
        let parts = outcome.reply.into_parts();

        let mut response = actix_web::HttpResponse::build(
            StatusCode::from_u16(parts.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        );
        response.insert_header(("content-type", parts.content_type));
        if let Some(location) = parts.location {
            response.insert_header(("location", location));
        }
        if let Some(cookie) = outcome.set_cookie {
            response.insert_header(("set-cookie", cookie));
        }

        response.body(parts.body)
    }
}

/// Bind the server without starting it; returns the server future and the
/// addresses it is listening on.
pub fn listen(state: AppState<MemoryStore>, address: &str) -> std::io::Result<(Server, Vec<SocketAddr>)> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .default_service(web::route().to(handle_all))
    })
    .bind(address)?;

    let addrs = server.addrs();
    Ok((server.run(), addrs))
}

async fn handle_all(
    state: web::Data<AppState<MemoryStore>>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let spin_req = adapter::actix_to_spin_request(&req, body);
    let outcome = router::dispatch(state.get_ref(), &spin_req);
    adapter::outcome_to_actix(outcome)
}

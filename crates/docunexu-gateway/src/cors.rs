//! CORS configuration for the gateway binary.

use actix_cors::Cors;
use actix_web::http::header;

/// Build the CORS middleware from allowed origins.
///
/// Browser callers (the dashboard's API playground) send the API key in
/// `Authorization` and upload files as multipart, so both headers are allowed.
/// Wildcard `*` only reaches this point in insecure dev mode.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin_str)
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .max_age(3600)
}

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::error::GatewayError;
use crate::metrics::REQUESTS_TOTAL;
use crate::proxy::{headers_from_actix, InboundRequest, RelayedResponse};
use crate::state::AppState;
use crate::store::{BalanceStore, CredentialValidator, UsageLog};
use crate::validation::{sanitize_path, sanitize_query};

const API_PREFIX: &str = "/v1";

/// Path suffix after `/v1/`, taken from the undecoded path so that an encoded
/// `?` or `#` stays encoded on its way upstream.
fn api_suffix(req: &HttpRequest) -> Result<&str, GatewayError> {
    let suffix = req
        .uri()
        .path()
        .strip_prefix(API_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or_default();
    if suffix.is_empty() {
        return Err(GatewayError::NotFound);
    }
    Ok(suffix)
}

/// Buffer the request body, refusing anything over `limit` bytes.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Bytes, GatewayError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            GatewayError::InvalidRequest(format!("failed to read request body: {e}"))
        })?;
        if body.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

async fn relay<C, B, U>(
    req: &HttpRequest,
    payload: web::Payload,
    state: &AppState<C, B, U>,
) -> Result<RelayedResponse, GatewayError>
where
    C: CredentialValidator,
    B: BalanceStore,
    U: UsageLog,
{
    let suffix = api_suffix(req)?;
    let headers = headers_from_actix(req.headers());
    let caller = state.gateway.admit(&headers, suffix).await?;

    let path = sanitize_path(suffix)?;
    let query = match req.uri().query() {
        Some(q) => Some(sanitize_query(q)?).filter(|q| !q.is_empty()),
        None => None,
    };
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| GatewayError::InvalidRequest("unsupported method".to_string()))?;
    let body = read_body(payload, state.config.max_body_bytes).await?;

    let inbound = InboundRequest {
        method,
        path,
        query,
        headers,
        body,
    };
    state.gateway.forward(&caller, inbound).await
}

/// GET|POST|PUT|DELETE /v1/{path:.*} - Authenticate, meter and proxy to the document API
pub async fn proxy<C, B, U>(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState<C, B, U>>,
) -> Result<HttpResponse, GatewayError>
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    let result = relay(&req, payload, &state).await;

    let status = match &result {
        Ok(relayed) => relayed.status.as_u16(),
        Err(e) => e.status_code().as_u16(),
    }
    .to_string();
    REQUESTS_TOTAL
        .with_label_values(&[req.method().as_str(), status.as_str()])
        .inc();

    result.map(|relayed| relayed.into_http_response())
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(serde_json::json!({
        "error": "Method not allowed",
        "message": "Use GET, POST, PUT or DELETE",
    }))
}

pub fn configure<C, B, U>(cfg: &mut web::ServiceConfig)
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    cfg.service(
        web::resource(["/v1", "/v1/{path:.*}"])
            .route(web::get().to(proxy::<C, B, U>))
            .route(web::post().to(proxy::<C, B, U>))
            .route(web::put().to(proxy::<C, B, U>))
            .route(web::delete().to(proxy::<C, B, U>))
            .default_service(web::to(method_not_allowed)),
    );
}

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::proxy::headers_from_actix;
use crate::state::AppState;
use crate::store::{BalanceStore, CredentialValidator, UsageLog};

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub limit: Option<u32>,
}

/// GET /account/usage - Balance and recent usage for the calling API key
pub async fn usage<C, B, U>(
    req: HttpRequest,
    query: web::Query<UsageQuery>,
    state: web::Data<AppState<C, B, U>>,
) -> Result<HttpResponse, GatewayError>
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    let headers = headers_from_actix(req.headers());
    let summary = state.gateway.account_usage(&headers, query.limit).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub fn configure<C, B, U>(cfg: &mut web::ServiceConfig)
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    cfg.route("/account/usage", web::get().to(usage::<C, B, U>));
}

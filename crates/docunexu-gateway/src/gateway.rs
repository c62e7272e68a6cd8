//! The metered proxy pipeline.
//!
//! Each call runs the same linear sequence. [`Gateway::admit`] extracts the
//! bearer token, resolves the caller and pre-checks the balance; only then is
//! the path validated and the body read. [`Gateway::forward`] classifies the
//! body, sends it upstream, and meters the call if it succeeded. Any stage may short-circuit with a
//! [`GatewayError`]. The gateway holds no mutable state of its own; balances
//! and usage live behind the store capabilities.

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use crate::body::RequestBody;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metering::meter_call;
use crate::metrics::{AUTH_FAILURES, SANDBOX_REQUESTS, UPSTREAM_LATENCY};
use crate::proxy::{InboundRequest, RelayedResponse, Upstream};
use crate::store::{Balance, BalanceStore, CredentialValidator, UsageLog};
use crate::validation::constant_time_eq;

pub const DEFAULT_USAGE_LIMIT: u32 = 20;
pub const MAX_USAGE_LIMIT: u32 = 100;

/// Who is making the call, once the credential has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The reserved sandbox token: no account, never metered.
    Sandbox,
    /// An active API key owned by this account.
    Account(String),
}

/// Account summary returned by `GET /account/usage`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountUsage {
    pub account_id: String,
    pub credits: i64,
    pub credit_limit: i64,
    pub usage: Vec<UsageEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageEntry {
    pub endpoint: String,
    pub credits_used: i64,
    /// RFC 3339
    pub created_at: String,
}

pub struct Gateway<C, B, U> {
    credentials: C,
    balances: B,
    usage: U,
    upstream: Upstream,
    sandbox_token: Option<String>,
}

impl<C, B, U> Gateway<C, B, U>
where
    C: CredentialValidator,
    B: BalanceStore,
    U: UsageLog,
{
    /// Fails if the upstream master credential is absent, so a misconfigured
    /// server never starts accepting requests.
    pub fn new(
        config: &GatewayConfig,
        credentials: C,
        balances: B,
        usage: U,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            credentials,
            balances,
            usage,
            upstream: Upstream::new(config)?,
            sandbox_token: config.sandbox_token.clone(),
        })
    }

    /// Authenticate the caller and pre-check its balance.
    ///
    /// Runs before the request path is validated or the body is read, so an
    /// unauthenticated caller learns nothing beyond the 401.
    pub async fn admit(&self, headers: &HeaderMap, path: &str) -> Result<Caller, GatewayError> {
        match self.resolve_caller(headers).await {
            Ok(caller) => Ok(caller),
            Err(e) => {
                AUTH_FAILURES.with_label_values(&[e.kind()]).inc();
                tracing::info!(path = %path, reason = e.kind(), "request rejected");
                Err(e)
            }
        }
    }

    async fn resolve_caller(&self, headers: &HeaderMap) -> Result<Caller, GatewayError> {
        let token = bearer_token(headers)?;
        let caller = self.authenticate(token).await?;
        if let Caller::Account(account_id) = &caller {
            self.check_balance(account_id).await?;
        }
        Ok(caller)
    }

    /// Forward an admitted call upstream and meter it if it succeeded.
    pub async fn forward(
        &self,
        caller: &Caller,
        request: InboundRequest,
    ) -> Result<RelayedResponse, GatewayError> {
        let InboundRequest {
            method,
            path,
            query,
            headers,
            body,
        } = request;

        let content_type = headers.get(CONTENT_TYPE);
        let body = RequestBody::from_request(
            &method,
            content_type.and_then(|v| v.to_str().ok()),
            body,
        )
        .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;
        let body_kind = body.kind();

        let timer = UPSTREAM_LATENCY.start_timer();
        let result = self
            .upstream
            .forward(method.clone(), &path, query.as_deref(), content_type, body)
            .await;
        timer.observe_duration();
        let response = result?;

        match caller {
            Caller::Account(account_id) => {
                tracing::info!(
                    account_id = %account_id,
                    method = %method,
                    path = %path,
                    body = body_kind,
                    status = response.status.as_u16(),
                    "proxied request"
                );
                if response.is_success() {
                    let endpoint = endpoint_name(&path);
                    meter_call(&self.balances, &self.usage, account_id, &endpoint).await;
                }
            }
            Caller::Sandbox => {
                tracing::info!(
                    method = %method,
                    path = %path,
                    body = body_kind,
                    status = response.status.as_u16(),
                    "proxied sandbox request"
                );
            }
        }

        Ok(response)
    }

    /// Resolve a bearer token to a caller.
    pub async fn authenticate(&self, token: &str) -> Result<Caller, GatewayError> {
        if let Some(sandbox) = &self.sandbox_token {
            if constant_time_eq(token.as_bytes(), sandbox.as_bytes()) {
                SANDBOX_REQUESTS.inc();
                return Ok(Caller::Sandbox);
            }
        }

        let credential = match self.credentials.validate(token).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(GatewayError::InvalidCredential),
            Err(e) => {
                tracing::warn!(error = %e, "credential lookup failed");
                return Err(GatewayError::InvalidCredential);
            }
        };

        if !credential.is_active {
            tracing::info!(account_id = %credential.account_id, "deactivated API key used");
            return Err(GatewayError::DeactivatedCredential);
        }

        Ok(Caller::Account(credential.account_id))
    }

    /// Reject the call before it reaches upstream if the account has nothing left.
    /// A failed or empty lookup is treated the same as a zero balance.
    async fn check_balance(&self, account_id: &str) -> Result<(), GatewayError> {
        match self.balances.balance(account_id).await {
            Ok(Some(balance)) if balance.credits > 0 => Ok(()),
            Ok(_) => Err(GatewayError::InsufficientCredits),
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "balance lookup failed");
                Err(GatewayError::InsufficientCredits)
            }
        }
    }

    /// Balance and recent usage for the account owning the bearer token.
    /// Not metered. The sandbox token has no account and is rejected.
    pub async fn account_usage(
        &self,
        headers: &HeaderMap,
        limit: Option<u32>,
    ) -> Result<AccountUsage, GatewayError> {
        let token = bearer_token(headers)?;
        let account_id = match self.authenticate(token).await? {
            Caller::Account(id) => id,
            Caller::Sandbox => return Err(GatewayError::InvalidCredential),
        };

        let balance = self
            .balances
            .balance(&account_id)
            .await?
            .unwrap_or(Balance {
                credits: 0,
                credit_limit: 0,
            });

        let limit = limit
            .unwrap_or(DEFAULT_USAGE_LIMIT)
            .clamp(1, MAX_USAGE_LIMIT);
        let usage = self
            .usage
            .recent(&account_id, limit)
            .await?
            .into_iter()
            .map(|record| UsageEntry {
                endpoint: record.endpoint,
                credits_used: record.credits_used,
                created_at: chrono::DateTime::from_timestamp(record.created_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(AccountUsage {
            account_id,
            credits: balance.credits,
            credit_limit: balance.credit_limit,
            usage,
        })
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
/// The scheme is matched case-sensitively and the token ends at the next space.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GatewayError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|rest| rest.split(' ').next())
        .unwrap_or_default();

    if token.is_empty() {
        return Err(GatewayError::MissingCredential);
    }
    Ok(token)
}

/// Usage records store the decoded path suffix.
fn endpoint_name(path: &str) -> String {
    urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

//! Account database reached over a PostgREST-style HTTP API.
//!
//! Endpoints used (relative to the configured base URL):
//! - `POST /rest/v1/rpc/validate_api_key` `{input_key}` → `[{user_id, is_active}]`
//! - `GET  /rest/v1/profiles?id=eq.<id>&select=credits,credit_limit`
//! - `POST /rest/v1/rpc/decrement_credits` `{p_user_id, p_amount}` → `bool`
//! - `POST /rest/v1/usage_logs`
//! - `GET  /rest/v1/usage_logs?user_id=eq.<id>&order=created_at.desc&limit=<n>`
//!
//! `decrement_credits` is expected to be a single `UPDATE … WHERE credits >= p_amount`
//! returning whether a row changed.

use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    ApiCredential, Balance, BalanceStore, CredentialValidator, StoreError, UsageLog, UsageRecord,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(serde::Deserialize)]
struct KeyRow {
    user_id: String,
    is_active: bool,
}

#[derive(serde::Deserialize)]
struct ProfileRow {
    credits: i64,
    #[serde(default)]
    credit_limit: Option<i64>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct UsageRow {
    user_id: String,
    endpoint: String,
    credits_used: i64,
    created_at: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "store returned non-success response");
            return Err(StoreError::Backend(format!("store returned {status}")));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

impl CredentialValidator for RestStore {
    async fn validate(&self, token: &str) -> Result<Option<ApiCredential>, StoreError> {
        let rows: Vec<KeyRow> = self
            .json(
                self.http
                    .post(self.url("rpc/validate_api_key"))
                    .json(&serde_json::json!({ "input_key": token })),
            )
            .await?;

        Ok(rows.into_iter().next().map(|row| ApiCredential {
            account_id: row.user_id,
            is_active: row.is_active,
        }))
    }
}

impl BalanceStore for RestStore {
    async fn balance(&self, account_id: &str) -> Result<Option<Balance>, StoreError> {
        let url = format!(
            "{}?id=eq.{}&select=credits,credit_limit",
            self.url("profiles"),
            urlencoding::encode(account_id)
        );
        let rows: Vec<ProfileRow> = self.json(self.http.get(url)).await?;

        Ok(rows.into_iter().next().map(|row| Balance {
            credits: row.credits,
            credit_limit: row.credit_limit.unwrap_or(row.credits),
        }))
    }

    async fn decrement(&self, account_id: &str, amount: i64) -> Result<bool, StoreError> {
        self.json::<bool>(
            self.http
                .post(self.url("rpc/decrement_credits"))
                .json(&serde_json::json!({ "p_user_id": account_id, "p_amount": amount })),
        )
        .await
    }
}

impl UsageLog for RestStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let created_at = chrono::DateTime::from_timestamp(record.created_at, 0)
            .ok_or_else(|| StoreError::Malformed(format!("timestamp {}", record.created_at)))?
            .to_rfc3339();
        let row = UsageRow {
            user_id: record.account_id.clone(),
            endpoint: record.endpoint.clone(),
            credits_used: record.credits_used,
            created_at,
        };

        self.send(
            self.http
                .post(self.url("usage_logs"))
                .header("Prefer", "return=minimal")
                .json(&row),
        )
        .await?;
        Ok(())
    }

    async fn recent(&self, account_id: &str, limit: u32) -> Result<Vec<UsageRecord>, StoreError> {
        let url = format!(
            "{}?user_id=eq.{}&select=user_id,endpoint,credits_used,created_at&order=created_at.desc&limit={}",
            self.url("usage_logs"),
            urlencoding::encode(account_id),
            limit
        );
        let rows: Vec<UsageRow> = self.json(self.http.get(url)).await?;

        rows.into_iter()
            .map(|row| {
                let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
                    .map_err(|e| StoreError::Malformed(format!("created_at: {e}")))?
                    .timestamp();
                Ok(UsageRecord {
                    account_id: row.user_id,
                    endpoint: row.endpoint,
                    credits_used: row.credits_used,
                    created_at,
                })
            })
            .collect()
    }
}

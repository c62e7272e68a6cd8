use actix_web::HttpResponse;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};

use crate::body::RequestBody;
use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Transport-level response headers that are not relayed.
/// The gateway re-frames the body, so framing headers from upstream would be wrong.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// A request as received by the gateway, detached from the HTTP framework.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path suffix after `/v1/`, sanitized but still percent-encoded
    pub path: String,
    /// Original query string without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream status, headers and body, ready to be returned to the caller.
#[derive(Debug, Clone)]
pub struct RelayedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RelayedResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into an actix response without touching status, headers or body.
    pub fn into_http_response(self) -> HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(self.status.as_u16())
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
        let mut response = HttpResponse::build(status).body(self.body);

        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            let (Ok(name), Ok(value)) = (
                actix_web::http::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                actix_web::http::header::HeaderValue::from_bytes(value.as_bytes()),
            ) else {
                continue;
            };
            headers.append(name, value);
        }
        response
    }
}

/// Client for the upstream document API, holding the master credential.
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderName,
    master_key: HeaderValue,
    max_response_bytes: usize,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("base_url", &self.base_url)
            .field("auth_header", &self.auth_header)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl Upstream {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.master_api_key.trim().is_empty() {
            tracing::error!("PDFCO_MASTER_API_KEY is not configured on the server");
            return Err(GatewayError::UpstreamConfigurationMissing);
        }

        let auth_header = HeaderName::from_bytes(config.upstream_auth_header.as_bytes())
            .map_err(|e| GatewayError::Internal(format!("invalid upstream auth header: {e}")))?;
        let mut master_key = HeaderValue::from_str(config.master_api_key.trim())
            .map_err(|_| GatewayError::UpstreamConfigurationMissing)?;
        master_key.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            auth_header,
            master_key,
            max_response_bytes: config.max_body_bytes,
        })
    }

    /// `<base>/<path>?<query>`
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}/{}?{}", self.base_url, path, q),
            _ => format!("{}/{}", self.base_url, path),
        }
    }

    /// Send the request upstream with the master credential and relay the answer.
    ///
    /// Only the content type (for non-multipart bodies) is copied from the caller;
    /// the caller's own Authorization header never leaves the gateway.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        content_type: Option<&HeaderValue>,
        body: RequestBody,
    ) -> Result<RelayedResponse, GatewayError> {
        let url = self.target_url(path, query);
        let mut builder = self
            .client
            .request(method, &url)
            .header(self.auth_header.clone(), self.master_key.clone());

        if body.forwards_content_type() {
            if let Some(ct) = content_type {
                builder = builder.header(CONTENT_TYPE, ct.clone());
            }
        }

        let builder = body
            .apply(builder)
            .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(path = %path, "upstream request timed out");
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::Upstream(format!("upstream request failed: {e}"))
            }
        })?;

        let status = response.status();
        let headers = relay_headers(response.headers(), &self.auth_header);

        if let Some(cl) = response.content_length() {
            if cl > self.max_response_bytes as u64 {
                return Err(GatewayError::UpstreamTooLarge(format!(
                    "{} bytes (max {})",
                    cl, self.max_response_bytes
                )));
            }
        }

        // Read progressively so a chunked response without Content-Length is still bounded.
        let mut buf = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(self.max_response_bytes),
        );
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::Upstream(format!("failed to read upstream response: {e}"))
            }
        })? {
            if buf.len() + chunk.len() > self.max_response_bytes {
                return Err(GatewayError::UpstreamTooLarge(format!(
                    "max {} bytes",
                    self.max_response_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(RelayedResponse {
            status,
            headers,
            body: Bytes::from(buf),
        })
    }
}

/// Convert inbound actix headers into the client's header types.
/// Headers that cannot be represented are dropped.
pub fn headers_from_actix(inbound: &actix_web::http::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound.iter() {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    headers
}

/// Copy upstream response headers, dropping framing headers and the master credential header.
pub fn relay_headers(upstream: &HeaderMap, secret_header: &HeaderName) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        if name == secret_header || HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

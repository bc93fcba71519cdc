//! Typed client for the algod v2 REST API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET  | `/v2/transactions/params` | Suggested parameters |
//! | POST | `/v2/transactions` | Submit signed bytes (`application/x-binary`) |
//! | GET  | `/v2/transactions/pending/{txid}` | Pool / confirmation state |
//! | GET  | `/v2/status` | Node status |
//! | GET  | `/v2/status/wait-for-block-after/{round}` | Block wait |
//! | GET  | `/v2/applications/{id}/box?name=b64:…` | Box value |
//! | POST | `/v2/teal/compile` | Compile TEAL |
//! | GET  | `/v2/accounts/{address}` | Balance summary |
//!
//! Every request carries the `X-Algo-API-Token` header. GET requests are
//! retried on transport errors and 5xx answers; POST requests are sent
//! exactly once.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::address::Address;
use crate::algod::{
    AccountInfo, Algod, CompiledProgram, NodeStatus, PendingTransaction, TransactionParams,
};
use crate::config::AnchorConfig;
use crate::error::AnchoringError;
use crate::retry::Backoff;
use crate::txn::decode_signed_group;

const TOKEN_HEADER: &str = "x-algo-api-token";

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize)]
struct BoxResponse {
    value: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// algod client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAlgod {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAlgod {
    /// Build a client for `base_url`, authenticating with `token`.
    pub fn new(base_url: &Url, token: &str, timeout: Duration) -> Result<Self, AnchoringError> {
        let mut headers = HeaderMap::new();
        if !token.is_empty() {
            let mut value = HeaderValue::from_str(token).map_err(|_| AnchoringError::Network {
                endpoint: "client setup".into(),
                message: "API token contains invalid header characters".into(),
            })?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AnchoringError::Network {
                endpoint: "client setup".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the loaded configuration.
    pub fn from_config(config: &AnchorConfig) -> Result<Self, AnchoringError> {
        Self::new(
            &config.algod_url,
            config.algod_token.as_str(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send the GET built by `build`, with backoff on transport and 5xx
    /// failures. Other statuses are returned to the caller.
    async fn send_get<B>(
        &self,
        endpoint: &str,
        build: B,
    ) -> Result<reqwest::Response, AnchoringError>
    where
        B: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        Backoff::READS
            .run(endpoint, move || async move {
                let resp = build().send().await.map_err(|e| network(endpoint, e))?;
                if resp.status().is_server_error() {
                    return Err(api_error(endpoint, resp).await);
                }
                Ok(resp)
            })
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
    ) -> Result<T, AnchoringError> {
        let url = self.url(path);
        let resp = self.send_get(endpoint, || self.http.get(&url)).await?;
        decode(endpoint, ensure_success(endpoint, resp).await?).await
    }
}

fn network(endpoint: &str, e: reqwest::Error) -> AnchoringError {
    AnchoringError::Network {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

async fn ensure_success(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, AnchoringError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    Err(api_error(endpoint, resp).await)
}

async fn api_error(endpoint: &str, resp: reqwest::Response) -> AnchoringError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    AnchoringError::Api {
        endpoint: endpoint.to_string(),
        status,
        body,
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, AnchoringError> {
    resp.json().await.map_err(|e| AnchoringError::Deserialization {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

fn node_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.to_string())
}

fn b64_decode(endpoint: &str, field: &str, value: &str) -> Result<Vec<u8>, AnchoringError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| AnchoringError::Deserialization {
            endpoint: endpoint.to_string(),
            message: format!("{field}: {e}"),
        })
}

#[async_trait]
impl Algod for HttpAlgod {
    async fn transaction_params(&self) -> Result<TransactionParams, AnchoringError> {
        self.get_json("GET /v2/transactions/params", "/v2/transactions/params")
            .await
    }

    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String, AnchoringError> {
        let endpoint = "POST /v2/transactions";
        let resp = self
            .http
            .post(self.url("/v2/transactions"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(signed.to_vec())
            .send()
            .await
            .map_err(|e| network(endpoint, e))?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            let txid = decode_signed_group(signed)
                .ok()
                .and_then(|group| group.first().and_then(|t| t.id().ok()))
                .unwrap_or_default();
            return Err(AnchoringError::Rejected {
                txid,
                message: node_message(&body),
            });
        }
        let resp = ensure_success(endpoint, resp).await?;
        let body: SubmitResponse = decode(endpoint, resp).await?;
        tracing::debug!(txid = %body.tx_id, bytes = signed.len(), "submitted to algod");
        Ok(body.tx_id)
    }

    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, AnchoringError> {
        let endpoint = format!("GET /v2/transactions/pending/{txid}");
        self.get_json(&endpoint, &format!("/v2/transactions/pending/{txid}"))
            .await
    }

    async fn status(&self) -> Result<NodeStatus, AnchoringError> {
        self.get_json("GET /v2/status", "/v2/status").await
    }

    async fn wait_for_block_after(&self, round: u64) -> Result<NodeStatus, AnchoringError> {
        let endpoint = format!("GET /v2/status/wait-for-block-after/{round}");
        self.get_json(&endpoint, &format!("/v2/status/wait-for-block-after/{round}"))
            .await
    }

    async fn application_box(
        &self,
        app_id: u64,
        name: &[u8],
    ) -> Result<Option<Vec<u8>>, AnchoringError> {
        let endpoint = format!("GET /v2/applications/{app_id}/box");
        let url = self.url(&format!("/v2/applications/{app_id}/box"));
        let name_param = format!(
            "b64:{}",
            base64::engine::general_purpose::STANDARD.encode(name)
        );
        let resp = self
            .send_get(&endpoint, || {
                self.http.get(&url).query(&[("name", name_param.as_str())])
            })
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(&endpoint, resp).await?;
        let body: BoxResponse = decode(&endpoint, resp).await?;
        b64_decode(&endpoint, "value", &body.value).map(Some)
    }

    async fn compile(&self, source: &str) -> Result<Vec<u8>, AnchoringError> {
        let endpoint = "POST /v2/teal/compile";
        let resp = self
            .http
            .post(self.url("/v2/teal/compile"))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| network(endpoint, e))?;

        if resp.status().is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchoringError::Compile(node_message(&body)));
        }
        let resp = ensure_success(endpoint, resp).await?;
        let body: CompiledProgram = decode(endpoint, resp).await?;
        tracing::debug!(hash = %body.hash, "program compiled");
        b64_decode(endpoint, "result", &body.result)
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, AnchoringError> {
        let endpoint = format!("GET /v2/accounts/{address}");
        self.get_json(&endpoint, &format!("/v2/accounts/{address}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let url = Url::parse("http://localhost:4001/").unwrap();
        let algod = HttpAlgod::new(&url, "t", Duration::from_secs(1)).unwrap();
        assert_eq!(algod.url("/v2/status"), "http://localhost:4001/v2/status");
    }

    #[test]
    fn test_node_message_prefers_json_message() {
        assert_eq!(node_message(r#"{"message":"overspend"}"#), "overspend");
        assert_eq!(node_message("plain text"), "plain text");
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let url = Url::parse("http://localhost:4001").unwrap();
        let algod = HttpAlgod::new(&url, "super-secret-token", Duration::from_secs(1)).unwrap();
        assert!(!format!("{algod:?}").contains("super-secret-token"));
    }
}

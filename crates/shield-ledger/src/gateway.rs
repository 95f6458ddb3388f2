//! Ledger gateways.
//!
//! A [`LedgerGateway`] produces a connected [`LedgerContract`]. The HTTP
//! gateway talks to a REST bridge in front of the ledger peers:
//!
//! ```text
//! POST {base_url}/submit    {"channel", "chaincode", "fcn", "args"}  -> 2xx
//! POST {base_url}/evaluate  {"channel", "chaincode", "fcn", "args"}  -> JSON result
//! ```
//!
//! `GetMetadata` answers 404 (or a JSON `null`) for a missing key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use shield_core::{Error, LedgerConfig, Result};

use crate::contract::{LedgerContract, LedgerEntry, Query, Transaction};

/// Produces connected contract handles.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn LedgerContract>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Gateway over the ledger's HTTP bridge.
#[derive(Debug, Clone)]
pub struct HttpLedgerGateway {
    config: LedgerConfig,
}

impl HttpLedgerGateway {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn connect(&self) -> Result<Arc<dyn LedgerContract>> {
        let base_url = Url::parse(&self.config.base_url).map_err(|e| {
            Error::Config(format!(
                "invalid ledger url {}: {}",
                self.config.base_url, e
            ))
        })?;

        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            subsystem = "ledger",
            component = "http_gateway",
            op = "connect",
            base_url = %base_url,
            channel = %self.config.channel,
            chaincode = %self.config.chaincode,
            "Ledger gateway connected"
        );

        let contract: Arc<dyn LedgerContract> = Arc::new(HttpLedgerContract {
            client,
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            channel: self.config.channel.clone(),
            chaincode: self.config.chaincode.clone(),
            api_token: self.config.api_token.clone(),
            timeout: self.config.timeout,
        });
        Ok(contract)
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}/{})",
            self.config.base_url, self.config.channel, self.config.chaincode
        )
    }
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    channel: &'a str,
    chaincode: &'a str,
    fcn: &'a str,
    args: Vec<String>,
}

/// Contract handle bound to one channel and chaincode.
struct HttpLedgerContract {
    client: Client,
    base_url: String,
    channel: String,
    chaincode: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpLedgerContract {
    async fn invoke(
        &self,
        endpoint: &str,
        fcn: &str,
        args: Vec<String>,
    ) -> Result<reqwest::Response> {
        let body = InvokeRequest {
            channel: &self.channel,
            chaincode: &self.chaincode,
            fcn,
            args,
        };

        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .timeout(self.timeout)
            .json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: format!("ledger {}", fcn),
                    after_ms: self.timeout.as_millis() as u64,
                }
            } else {
                Error::Request(format!("ledger {} request failed: {}", fcn, e))
            }
        })?;

        debug!(
            subsystem = "ledger",
            component = "http_gateway",
            op = fcn,
            status = response.status().as_u16(),
            "Ledger call answered"
        );
        Ok(response)
    }

    async fn rejection(fcn: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::Notarization(format!("ledger {} returned {}: {}", fcn, status, body))
    }
}

#[async_trait]
impl LedgerContract for HttpLedgerContract {
    async fn submit(&self, transaction: Transaction) -> Result<()> {
        let fcn = transaction.function();
        let response = self.invoke("submit", fcn, transaction.args()).await?;
        if !response.status().is_success() {
            return Err(Self::rejection(fcn, response).await);
        }
        Ok(())
    }

    async fn evaluate(&self, query: Query) -> Result<Option<LedgerEntry>> {
        let fcn = query.function();
        let response = self.invoke("evaluate", fcn, query.args()).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::rejection(fcn, response).await);
        }
        response.json().await.map_err(|e| {
            Error::Notarization(format!("ledger {} response unreadable: {}", fcn, e))
        })
    }
}

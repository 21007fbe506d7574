use alloy::primitives::Bytes;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{SettlementSimulator, SimulationReport, SimulatorError};
use crate::batch::SettlementBatch;

#[derive(Serialize)]
struct DeserializeRequest<'a> {
    payload: &'a Bytes,
}

/// Simulation oracle reached over HTTP.
///
/// `POST /deserialize` takes `{"payload": "0x.."}` and answers with the
/// parsed batch; `POST /simulate` takes a batch and answers with a
/// [`SimulationReport`].
pub struct HttpSimulator {
    client: Client,
    base_url: String,
}

impl HttpSimulator {
    pub fn new(base_url: &Url) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, SimulatorError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(SimulatorError::ApiError { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl SettlementSimulator for HttpSimulator {
    async fn deserialize(&self, payload: &Bytes) -> Result<Value, SimulatorError> {
        debug!(bytes = payload.len(), "Requesting payload deserialization");

        let response = self
            .post("/deserialize", &DeserializeRequest { payload })
            .await?;

        Ok(response.json().await?)
    }

    async fn simulate(&self, batch: &SettlementBatch) -> Result<SimulationReport, SimulatorError> {
        debug!(rings = batch.rings.len(), "Requesting simulation");

        let response = self.post("/simulate", batch).await?;

        Ok(response.json().await?)
    }
}

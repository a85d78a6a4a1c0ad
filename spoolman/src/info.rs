use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Client;

/// Response of the health endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Health {
    /// `healthy` when the instance is up.
    pub status: String,
}

/// Information about the Spoolman instance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Info {
    /// Spoolman version.
    pub version: String,

    /// Whether the instance runs in debug mode.
    #[serde(default)]
    pub debug_mode: bool,

    /// Database backend in use (`sqlite`, `postgres`, ...).
    pub db_type: Option<String>,
}

impl Client {
    /// Check that the instance is reachable and healthy.
    pub async fn health(&self) -> Result<bool> {
        let response = self.client.get(self.route("health")).send().await?;
        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), "spoolman health check failed");
            return Ok(false);
        }

        let health: Health = response.json().await?;
        Ok(health.status == "healthy")
    }

    /// Get information regarding the instance.
    pub async fn info(&self) -> Result<Info> {
        Ok(self
            .client
            .get(self.route("info"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

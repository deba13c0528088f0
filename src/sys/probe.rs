// src/sys/probe.rs

use async_trait::async_trait;
use std::time::Duration;

use crate::sys::traits::HttpProbe;

/// Probes the deployed application through the reverse proxy from the
/// operator's side. Connection failures and timeouts are errors; any HTTP
/// response, whatever the status, is a successful probe.
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("HTTP client construction failed: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn status(&self, url: &str) -> Result<u16, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("HTTP probe of {} failed: {}", url, e))?;
        Ok(response.status().as_u16())
    }
}

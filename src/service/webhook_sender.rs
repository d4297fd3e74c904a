use crate::domain::webhook::SIGNATURE_HEADER;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReply {
    pub status: u16,
    pub body: String,
}

/// Outbound POST to a merchant endpoint. An `Err` means no HTTP response was
/// obtained (connect failure, timeout).
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>, signature: &str) -> Result<SenderReply>;
}

#[derive(Clone)]
pub struct ReqwestSender {
    pub client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl WebhookSender for ReqwestSender {
    async fn post(&self, url: &str, body: Vec<u8>, signature: &str) -> Result<SenderReply> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(SenderReply { status, body })
    }
}

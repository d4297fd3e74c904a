use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity handed to the core by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEndpoint {
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct NewMerchant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub api_key: String,
    pub api_secret: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestMerchantInfo {
    pub id: Uuid,
    pub email: String,
    pub api_key: String,
    pub seeded: bool,
}

//! Web-app shortcut publishing

use async_trait::async_trait;
use berth_errors::Error;
use serde::{Deserialize, Serialize};

/// Launcher entry for a web app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub id: String,
    pub name: String,
    pub web_url: String,
    #[serde(skip)]
    pub icon: Vec<u8>,
}

#[async_trait]
pub trait WebAppPublisher: Send + Sync {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, Error>;

    async fn publish_shortcut(&self, shortcut: &Shortcut) -> Result<(), Error>;
}

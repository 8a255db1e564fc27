//! Take-once payloads carried across redirects.
//!
//! A redirect stores a [`Flash`] and appends `?flash=<id>` to its target; the
//! page it lands on takes the payload out again, so a reload shows nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// What a redirecting handler did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Store,
    Update,
    Delete,
}

/// Alert rendered at the top of the landing page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AlertAction>,
    pub status: AlertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<serde_json::Value>,
}

/// Either an outcome flag or a named failure such as `fileNotSaved`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertStatus {
    Done(bool),
    Code(String),
}

/// Payload stored for one redirect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flash {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<serde_json::Value>,
}

struct StoredFlash {
    flash: Flash,
    stored_at: Instant,
}

/// In-process flash storage
pub struct FlashStore {
    entries: RwLock<HashMap<Uuid, StoredFlash>>,
    ttl: Duration,
}

impl FlashStore {
    const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Store a payload and return the id to put in the redirect URL.
    ///
    /// Expired entries are dropped on every push, which bounds the map by the
    /// number of redirects issued within one TTL window.
    pub async fn push(&self, flash: Flash) -> Uuid {
        let id = Uuid::now_v7();
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, stored| stored.stored_at.elapsed() < ttl);
        entries.insert(
            id,
            StoredFlash {
                flash,
                stored_at: Instant::now(),
            },
        );
        id
    }

    /// Remove and return a payload; `None` when unknown or expired
    pub async fn take(&self, id: Uuid) -> Option<Flash> {
        let stored = self.entries.write().await.remove(&id)?;
        if stored.stored_at.elapsed() < self.ttl {
            Some(stored.flash)
        } else {
            None
        }
    }
}

impl Default for FlashStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the flash id to a redirect target
pub fn with_flash(path: &str, id: Uuid) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}flash={}", path, separator, id)
}

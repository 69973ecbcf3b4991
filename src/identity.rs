use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Staff identifier plus the opaque session credential used to authenticate
/// outbound calls. Written only by the identity binder; read by the sync
/// engine and the capture scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub staff_id: Option<String>,
    pub credential: Option<String>,
}

#[derive(Clone)]
pub struct IdentityStore {
    inner: Arc<RwLock<IdentityContext>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IdentityContext::default())),
        }
    }

    pub async fn context(&self) -> IdentityContext {
        self.inner.read().await.clone()
    }

    pub async fn credential(&self) -> Option<String> {
        self.inner.read().await.credential.clone()
    }

    pub async fn staff_id(&self) -> Option<String> {
        self.inner.read().await.staff_id.clone()
    }

    pub async fn set_credential(&self, credential: String) {
        self.inner.write().await.credential = Some(credential);
    }

    pub async fn set_staff_id(&self, staff_id: String) {
        self.inner.write().await.staff_id = Some(staff_id);
    }

    /// Drop both the credential and the bound staff id (logout).
    pub async fn clear(&self) {
        *self.inner.write().await = IdentityContext::default();
    }
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

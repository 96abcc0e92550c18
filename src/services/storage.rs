// src/services/storage.rs
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Credentials, RiderProfile};

/// Device secure/async storage for the bearer token and rider profile.
/// Cleared on logout or any 401.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn access_token(&self) -> Option<String>;
    async fn rider(&self) -> Option<RiderProfile>;
    async fn save(&self, credentials: Credentials);
    async fn clear(&self);
}

/// In-memory credential store: the default for tests and the headless
/// binary. A device build substitutes its platform keystore behind the same
/// trait.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(Some(credentials)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    async fn rider(&self) -> Option<RiderProfile> {
        self.inner.read().await.as_ref().map(|c| c.rider.clone())
    }

    async fn save(&self, credentials: Credentials) {
        *self.inner.write().await = Some(credentials);
    }

    async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> Credentials {
        Credentials {
            access_token: "token-abc".to_string(),
            rider: RiderProfile {
                id: "usr-1".to_string(),
                name: "Ada".to_string(),
                phone: "+2348098765432".to_string(),
                email: None,
                profile_picture: None,
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.access_token().await.is_none());

        store.save(test_credentials()).await;
        assert_eq!(store.access_token().await.as_deref(), Some("token-abc"));
        assert_eq!(store.rider().await.unwrap().id, "usr-1");

        store.clear().await;
        assert!(store.access_token().await.is_none());
        assert!(store.rider().await.is_none());
    }
}

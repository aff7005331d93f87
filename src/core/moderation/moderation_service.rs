// Moderation bookkeeping: per-guild command prefixes and the trusted-user
// list. Enforcement (who may run which command, message deletion) stays in
// the Discord layer; this service only answers questions and persists
// answers.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("prefix may not be empty")]
    EmptyPrefix,
}

/// Persistence for prefixes and the trusted list.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn prefixes(&self, guild_id: u64) -> Result<Vec<String>, ModerationError>;
    async fn add_prefix(&self, guild_id: u64, prefix: &str) -> Result<(), ModerationError>;
    async fn remove_prefix(&self, guild_id: u64, prefix: &str) -> Result<u64, ModerationError>;
    async fn clear_prefixes(&self, guild_id: u64) -> Result<u64, ModerationError>;

    async fn trusted_ids(&self) -> Result<Vec<u64>, ModerationError>;
    /// Returns false when the user was already trusted.
    async fn add_trusted(&self, user_id: u64) -> Result<bool, ModerationError>;
    async fn remove_trusted(&self, user_id: u64) -> Result<u64, ModerationError>;
}

pub struct ModerationService<S: ModerationStore> {
    store: S,
    /// Application owners discovered at startup. Always trusted.
    base_owners: RwLock<HashSet<u64>>,
    default_prefix: String,
}

impl<S: ModerationStore> ModerationService<S> {
    pub fn new(store: S, default_prefix: impl Into<String>) -> Self {
        Self {
            store,
            base_owners: RwLock::new(HashSet::new()),
            default_prefix: default_prefix.into(),
        }
    }

    pub async fn add_base_owner(&self, user_id: u64) {
        self.base_owners.write().await.insert(user_id);
    }

    /// Application owners plus everyone on the persisted trusted list.
    ///
    /// A storage failure degrades to "owners only" rather than locking the
    /// actual owners out.
    pub async fn is_trusted(&self, user_id: u64) -> bool {
        if self.base_owners.read().await.contains(&user_id) {
            return true;
        }
        match self.store.trusted_ids().await {
            Ok(ids) => ids.contains(&user_id),
            Err(err) => {
                warn!(error = %err, "Trusted list unavailable, falling back to owners");
                false
            }
        }
    }

    pub async fn trusted_list(&self) -> Result<Vec<u64>, ModerationError> {
        self.store.trusted_ids().await
    }

    /// Returns false when the user was already trusted.
    pub async fn trust(&self, user_id: u64) -> Result<bool, ModerationError> {
        if self.base_owners.read().await.contains(&user_id) {
            return Ok(false);
        }
        self.store.add_trusted(user_id).await
    }

    pub async fn untrust(&self, user_id: u64) -> Result<u64, ModerationError> {
        self.store.remove_trusted(user_id).await
    }

    /// Prefixes for a guild, falling back to the default when none are set
    /// or the store is unreachable.
    pub async fn guild_prefixes(&self, guild_id: u64) -> Vec<String> {
        match self.store.prefixes(guild_id).await {
            Ok(prefixes) if !prefixes.is_empty() => prefixes,
            Ok(_) => vec![self.default_prefix.clone()],
            Err(err) => {
                warn!(guild_id, error = %err, "Prefix lookup failed, using default");
                vec![self.default_prefix.clone()]
            }
        }
    }

    pub async fn add_prefix(&self, guild_id: u64, prefix: &str) -> Result<String, ModerationError> {
        let trimmed = prefix.trim_start();
        if trimmed.is_empty() {
            return Err(ModerationError::EmptyPrefix);
        }
        self.store.add_prefix(guild_id, trimmed).await?;
        Ok(trimmed.to_string())
    }

    pub async fn remove_prefix(&self, guild_id: u64, prefix: &str) -> Result<u64, ModerationError> {
        self.store.remove_prefix(guild_id, prefix.trim_start()).await
    }

    pub async fn clear_prefixes(&self, guild_id: u64) -> Result<u64, ModerationError> {
        self.store.clear_prefixes(guild_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemModerationStore {
        prefixes: StdMutex<HashMap<u64, Vec<String>>>,
        trusted: StdMutex<Vec<u64>>,
        fail: StdMutex<bool>,
    }

    #[async_trait]
    impl ModerationStore for MemModerationStore {
        async fn prefixes(&self, guild_id: u64) -> Result<Vec<String>, ModerationError> {
            if *self.fail.lock().unwrap() {
                return Err(ModerationError::Storage("down".to_string()));
            }
            Ok(self
                .prefixes
                .lock()
                .unwrap()
                .get(&guild_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn add_prefix(&self, guild_id: u64, prefix: &str) -> Result<(), ModerationError> {
            self.prefixes
                .lock()
                .unwrap()
                .entry(guild_id)
                .or_default()
                .push(prefix.to_string());
            Ok(())
        }

        async fn remove_prefix(&self, guild_id: u64, prefix: &str) -> Result<u64, ModerationError> {
            let mut prefixes = self.prefixes.lock().unwrap();
            let entries = prefixes.entry(guild_id).or_default();
            let before = entries.len();
            entries.retain(|p| p != prefix);
            Ok((before - entries.len()) as u64)
        }

        async fn clear_prefixes(&self, guild_id: u64) -> Result<u64, ModerationError> {
            let mut prefixes = self.prefixes.lock().unwrap();
            Ok(prefixes.remove(&guild_id).map(|v| v.len()).unwrap_or(0) as u64)
        }

        async fn trusted_ids(&self) -> Result<Vec<u64>, ModerationError> {
            if *self.fail.lock().unwrap() {
                return Err(ModerationError::Storage("down".to_string()));
            }
            Ok(self.trusted.lock().unwrap().clone())
        }

        async fn add_trusted(&self, user_id: u64) -> Result<bool, ModerationError> {
            let mut trusted = self.trusted.lock().unwrap();
            if trusted.contains(&user_id) {
                return Ok(false);
            }
            trusted.push(user_id);
            Ok(true)
        }

        async fn remove_trusted(&self, user_id: u64) -> Result<u64, ModerationError> {
            let mut trusted = self.trusted.lock().unwrap();
            let before = trusted.len();
            trusted.retain(|id| *id != user_id);
            Ok((before - trusted.len()) as u64)
        }
    }

    fn service() -> ModerationService<MemModerationStore> {
        ModerationService::new(MemModerationStore::default(), "!")
    }

    #[tokio::test]
    async fn owners_are_always_trusted() {
        let service = service();
        service.add_base_owner(1).await;

        assert!(service.is_trusted(1).await);
        assert!(!service.is_trusted(2).await);
    }

    #[tokio::test]
    async fn trusting_a_user_is_idempotent() {
        let service = service();

        assert!(service.trust(5).await.unwrap());
        assert!(!service.trust(5).await.unwrap());
        assert!(service.is_trusted(5).await);

        assert_eq!(service.untrust(5).await.unwrap(), 1);
        assert!(!service.is_trusted(5).await);
        assert_eq!(service.untrust(5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn trusting_an_owner_is_a_noop() {
        let service = service();
        service.add_base_owner(9).await;

        assert!(!service.trust(9).await.unwrap());
        assert!(service.trusted_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prefixes_fall_back_to_default() {
        let service = service();

        assert_eq!(service.guild_prefixes(10).await, vec!["!".to_string()]);

        service.add_prefix(10, "  ?").await.unwrap();
        assert_eq!(service.guild_prefixes(10).await, vec!["?".to_string()]);

        service.clear_prefixes(10).await.unwrap();
        assert_eq!(service.guild_prefixes(10).await, vec!["!".to_string()]);
    }

    #[tokio::test]
    async fn empty_prefixes_are_rejected() {
        let service = service();
        assert!(matches!(
            service.add_prefix(10, "   ").await,
            Err(ModerationError::EmptyPrefix)
        ));
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_owners_only() {
        let service = service();
        service.add_base_owner(1).await;
        service.trust(5).await.unwrap();
        *service.store.fail.lock().unwrap() = true;

        assert!(service.is_trusted(1).await);
        assert!(!service.is_trusted(5).await);
        assert_eq!(service.guild_prefixes(10).await, vec!["!".to_string()]);
    }
}

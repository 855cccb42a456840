//! Usage credit counter: remaining free interview simulations per user.
//!
//! Floor 0, no ceiling. Seeded with the configured free-trial count on first read.

use std::sync::Arc;

use tracing::warn;

use crate::store::{KeyValueStore, StoreError};

const USAGE_KEY_PREFIX: &str = "simu-interview-usage-";

#[derive(Clone)]
pub struct UsageCredits {
    store: Arc<dyn KeyValueStore>,
    free_trial: u32,
}

impl UsageCredits {
    pub fn new(store: Arc<dyn KeyValueStore>, free_trial: u32) -> Self {
        Self { store, free_trial }
    }

    fn key(user_id: &str) -> String {
        format!("{USAGE_KEY_PREFIX}{user_id}")
    }

    /// Current credit. Creates the counter with the free-trial default if absent.
    /// A corrupt value is treated as absent.
    pub async fn get(&self, user_id: &str) -> Result<u32, StoreError> {
        let key = Self::key(user_id);
        match self.store.get(&key).await? {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(count) => Ok(count),
                Err(_) => {
                    warn!("Usage counter for {user_id} is corrupt ({raw:?}); resetting");
                    self.store.set(&key, &self.free_trial.to_string()).await?;
                    Ok(self.free_trial)
                }
            },
            None => {
                self.store.set(&key, &self.free_trial.to_string()).await?;
                Ok(self.free_trial)
            }
        }
    }

    /// Spends one credit, never going below zero. Returns the new count.
    pub async fn decrement(&self, user_id: &str) -> Result<u32, StoreError> {
        let next = self.get(user_id).await?.saturating_sub(1);
        self.store.set(&Self::key(user_id), &next.to_string()).await?;
        Ok(next)
    }

    /// Tops up after a purchase. Returns the new count.
    pub async fn add(&self, user_id: &str, amount: u32) -> Result<u32, StoreError> {
        let next = self.get(user_id).await?.saturating_add(amount);
        self.store.set(&Self::key(user_id), &next.to_string()).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn credits(free_trial: u32) -> (Arc<MemoryStore>, UsageCredits) {
        let store = Arc::new(MemoryStore::default());
        (store.clone(), UsageCredits::new(store, free_trial))
    }

    #[tokio::test]
    async fn test_first_read_seeds_default() {
        let (store, credits) = credits(3);
        assert_eq!(credits.get("u").await.unwrap(), 3);
        assert_eq!(
            store.get("simu-interview-usage-u").await.unwrap().as_deref(),
            Some("3")
        );
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let (_, credits) = credits(1);
        assert_eq!(credits.decrement("u").await.unwrap(), 0);
        assert_eq!(credits.decrement("u").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_after_exhaustion() {
        let (_, credits) = credits(1);
        credits.decrement("u").await.unwrap();
        assert_eq!(credits.add("u", 1).await.unwrap(), 1);
        assert_eq!(credits.get("u").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (_, credits) = credits(3);
        credits.decrement("a").await.unwrap();
        assert_eq!(credits.get("a").await.unwrap(), 2);
        assert_eq!(credits.get("b").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_value_resets_to_default() {
        let (store, credits) = credits(3);
        store.set("simu-interview-usage-u", "lots").await.unwrap();
        assert_eq!(credits.get("u").await.unwrap(), 3);
    }
}

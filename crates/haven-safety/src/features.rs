//! User feature and risk lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use haven_types::error::Result;
use haven_types::user::UserFeatures;

/// Source of per-user risk level and consent flags.
///
/// Consumed by both the safety gate and the orchestrator. Unknown users
/// should resolve to `UserFeatures::default()` rather than an error; an
/// error makes the safety gate fail closed.
#[async_trait]
pub trait FeatureLookup: Send + Sync {
    async fn user_features(&self, user_id: &str) -> Result<UserFeatures>;
}

/// In-memory feature store.
#[derive(Debug, Default)]
pub struct StaticFeatureStore {
    users: RwLock<HashMap<String, UserFeatures>>,
}

impl StaticFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user's features.
    pub fn insert(&self, user_id: impl Into<String>, features: UserFeatures) {
        self.users.write().insert(user_id.into(), features);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_user(self, user_id: impl Into<String>, features: UserFeatures) -> Self {
        self.insert(user_id, features);
        self
    }
}

#[async_trait]
impl FeatureLookup for StaticFeatureStore {
    async fn user_features(&self, user_id: &str) -> Result<UserFeatures> {
        Ok(self.users.read().get(user_id).cloned().unwrap_or_default())
    }
}

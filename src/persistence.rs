use crate::context::Context;
use crate::model::ConsumeStatus;
use crate::Error;
use async_trait::async_trait;
use std::time::Duration;

/// Store contract the coordinator claims and finalizes through.
///
/// `mark_consuming` must be atomic across every caller sharing the store: for a
/// given identity at most one of them may observe `true` while the record lives.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Create the record as "consuming" with `ttl`, only if none exists.
    /// Returns `false` when a live record is already present.
    async fn mark_consuming(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<bool, Error>;

    /// Unconditionally set the record to "consumed" with `ttl`.
    async fn mark_consumed(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<(), Error>;

    /// Read the current status. Fails with [`Error::NotFound`] if absent or expired.
    async fn get(&self, ctx: &Context, id: &str) -> Result<ConsumeStatus, Error>;

    /// Remove the record. Absence is not an error.
    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error>;
}

/// Store key for `id`, namespaced by `topic`.
pub fn record_key(topic: &str, id: &str) -> String {
    format!("cmq:{topic}:{id}")
}

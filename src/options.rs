use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::model::Config;
use crate::persistence::Persistence;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Worker stored in [`Options`]
pub type WorkerFn<T> =
    Arc<dyn Fn(Context, T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Derives the dedup identity of a message
pub type IdFn<T> = Arc<dyn Fn(&T) -> Result<String, Error> + Send + Sync>;

/// Everything an invocation needs, set through independent `with_*` calls.
///
/// Without a persistence adapter there is no deduplication: the worker runs on
/// every invocation.
pub struct Options<T> {
    pub(crate) config: Config,
    pub(crate) worker: Option<WorkerFn<T>>,
    pub(crate) id_fn: Option<IdFn<T>>,
    pub(crate) persistence: Option<Arc<dyn Persistence>>,
}

impl<T> Options<T> {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            worker: None,
            id_fn: None,
            persistence: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_worker_seconds(mut self, seconds: u64) -> Self {
        self.config.worker_seconds = seconds;
        self
    }

    pub fn with_retention_seconds(mut self, seconds: u64) -> Self {
        self.config.retention_seconds = seconds;
        self
    }

    pub fn with_max_claim_attempts(mut self, attempts: u32) -> Self {
        self.config.max_claim_attempts = attempts;
        self
    }

    pub fn with_worker<F, Fut, E>(mut self, worker: F) -> Self
    where
        T: 'static,
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.worker = Some(Arc::new(move |ctx, message| {
            let fut = worker(ctx, message);
            async move { fut.await.map_err(Into::<BoxError>::into) }.boxed()
        }));
        self
    }

    pub fn with_id_fn<F>(mut self, id_fn: F) -> Self
    where
        F: Fn(&T) -> Result<String, Error> + Send + Sync + 'static,
    {
        self.id_fn = Some(Arc::new(id_fn));
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dedup_enabled(&self) -> bool {
        self.persistence.is_some()
    }

    /// Check the combination is usable. Timing and the identity function only
    /// matter once a persistence adapter is set.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.dedup_enabled() {
            return Ok(());
        }
        if self.id_fn.is_none() {
            return Err(Error::Config(
                "an id function is required when persistence is configured".to_string(),
            ));
        }
        self.config.validate()
    }
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            worker: self.worker.clone(),
            id_fn: self.id_fn.clone(),
            persistence: self.persistence.clone(),
        }
    }
}

impl<T> fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("worker", &self.worker.is_some())
            .field("id_fn", &self.id_fn.is_some())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPersistence;

    fn order_id(order: &String) -> Result<String, Error> {
        Ok(order.clone())
    }

    #[test]
    fn test_without_persistence_is_always_valid() {
        let options: Options<String> = Options::new();
        assert!(!options.dedup_enabled());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_persistence_requires_id_fn() {
        let options: Options<String> = Options::new()
            .with_worker_seconds(30)
            .with_retention_seconds(3600)
            .with_persistence(Arc::new(InMemoryPersistence::new("orders")));
        assert!(matches!(options.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_persistence_requires_durations() {
        let options: Options<String> = Options::new()
            .with_id_fn(order_id)
            .with_persistence(Arc::new(InMemoryPersistence::new("orders")));
        assert!(matches!(options.validate(), Err(Error::Config(_))));

        let options = options.with_worker_seconds(30).with_retention_seconds(3600);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_setters_are_order_independent() {
        let a: Options<String> = Options::new()
            .with_retention_seconds(3600)
            .with_worker_seconds(30)
            .with_max_claim_attempts(5);
        let b: Options<String> = Options::new()
            .with_max_claim_attempts(5)
            .with_worker_seconds(30)
            .with_retention_seconds(3600);
        assert_eq!(a.config(), b.config());
        assert_eq!(a.config().max_claim_attempts, 5);
    }

    #[test]
    fn test_with_config() {
        let options: Options<String> = Options::new().with_config(Config::new(30, 3600));
        assert_eq!(options.config().worker_seconds, 30);
        assert_eq!(options.config().retention_seconds, 3600);
    }
}

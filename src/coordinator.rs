use crate::context::Context;
use crate::error::{BoxError, Error, Operation};
use crate::model::ConsumeStatus;
use crate::options::Options;
use crate::persistence::Persistence;
use std::fmt;
use std::future::Future;

#[cfg(feature = "tracing")]
use tracing::{debug, info, instrument, warn};

// No-op macros when tracing is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($tt:tt)*) => {{}};
}

/// Result of the claim phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// This invocation holds the "consuming" record
    Acquired,
    /// The identity was already consumed
    Duplicate,
}

/// Coordinates exactly-once-effect consumption of messages of type `T`.
///
/// Holds no state besides its options: all coordination goes through the
/// configured [`Persistence`], so any number of coordinators, in any number of
/// processes, may share one store.
pub struct Coordinator<T> {
    options: Options<T>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("options", &self.options)
            .finish()
    }
}

impl<T> Coordinator<T>
where
    T: fmt::Debug + Send,
{
    /// Create a new Coordinator, validating the options.
    pub fn new(options: Options<T>) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options<T> {
        &self.options
    }

    /// Consume `message` with the configured worker.
    pub async fn invoke(&self, ctx: &Context, message: T) -> Result<(), Error> {
        let worker = self
            .options
            .worker
            .clone()
            .ok_or_else(|| Error::Config("no worker configured".to_string()))?;

        self.invoke_with(ctx, message, move |ctx, message| worker(ctx, message))
            .await
    }

    /// Consume `message` with `worker`, at most once per identity while its record lives.
    ///
    /// - `Ok(())` if the worker ran and the message was marked consumed, or if
    ///   it had already been consumed
    /// - [`Error::StillConsuming`] if another invocation holds the claim
    /// - [`Error::Worker`] if the worker failed; the claim is rolled back
    /// - [`Error::Rollback`] if the worker failed and the rollback failed too
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(id)))]
    pub async fn invoke_with<F, Fut, E>(
        &self,
        ctx: &Context,
        message: T,
        worker: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Context, T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<BoxError>,
    {
        let Some(persistence) = self.options.persistence.as_deref() else {
            debug!("No persistence configured - invoking worker without dedup");
            return run_worker(ctx, message, worker).await;
        };

        let id_fn = self.options.id_fn.as_ref().ok_or_else(|| {
            Error::Config("an id function is required when persistence is configured".to_string())
        })?;
        let id = id_fn(&message)?;
        #[cfg(feature = "tracing")]
        tracing::Span::current().record("id", id.as_str());

        match self.claim(ctx, persistence, &id).await? {
            Claim::Acquired => {}
            Claim::Duplicate => {
                info!(id = %id, "Message already consumed - skipping");
                return Ok(());
            }
        }

        if let Err(err) = run_worker(ctx, message, worker).await {
            if err.is_cancellation() {
                // The claim lapses after worker_seconds
                warn!(id = %id, error = %err, "Worker interrupted - leaving claim to expire");
                return Err(err);
            }
            if let Err(delete_err) = persistence.delete(ctx, &id).await {
                warn!(id = %id, error = %err, "Worker failed and claim rollback failed");
                return Err(Error::Rollback {
                    id,
                    source: Box::new(delete_err),
                });
            }
            info!(id = %id, "Worker failed - claim rolled back");
            return Err(err);
        }

        persistence
            .mark_consumed(ctx, &id, self.options.config.retention_ttl())
            .await
            .map_err(|e| e.in_operation(Operation::MarkConsumed, &id))?;

        info!(id = %id, "Message consumed");
        Ok(())
    }

    /// Atomically claim `id`, looking at the existing record when contended.
    ///
    /// A record that disappears between the failed claim and the read sends us
    /// back to the atomic claim, so processing always follows a won claim.
    #[cfg_attr(feature = "tracing", instrument(skip(self, ctx, persistence)))]
    async fn claim(
        &self,
        ctx: &Context,
        persistence: &dyn Persistence,
        id: &str,
    ) -> Result<Claim, Error> {
        let worker_ttl = self.options.config.worker_ttl();
        let max_attempts = self.options.config.max_claim_attempts;

        for attempt in 1..=max_attempts {
            let claimed = persistence
                .mark_consuming(ctx, id, worker_ttl)
                .await
                .map_err(|e| e.in_operation(Operation::MarkConsuming, id))?;

            if claimed {
                debug!(attempt, "Claim acquired");
                return Ok(Claim::Acquired);
            }

            match persistence.get(ctx, id).await {
                Ok(ConsumeStatus::Consuming) => {
                    info!("Message is being consumed elsewhere");
                    return Err(Error::StillConsuming { id: id.to_string() });
                }
                Ok(ConsumeStatus::Consumed) => return Ok(Claim::Duplicate),
                Err(err) if err.is_not_found() => {
                    debug!(attempt, "Record vanished before it could be read - claiming again");
                }
                Err(err) => return Err(err.in_operation(Operation::Get, id)),
            }
        }

        warn!(max_attempts, "Claim still contended after all attempts");
        Err(Error::StillConsuming { id: id.to_string() })
    }
}

/// Run the worker under the context, wrapping its failure with the message.
async fn run_worker<T, F, Fut, E>(ctx: &Context, message: T, worker: F) -> Result<(), Error>
where
    T: fmt::Debug,
    F: FnOnce(Context, T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<BoxError>,
{
    let described = format!("{message:?}");
    ctx.run(async move {
        worker(ctx.clone(), message)
            .await
            .map_err(|e| Error::Worker {
                message: described,
                source: e.into(),
            })
    })
    .await
}

/// One-shot form of [`Coordinator::invoke`].
pub async fn invoke<T>(ctx: &Context, message: T, options: &Options<T>) -> Result<(), Error>
where
    T: fmt::Debug + Send,
{
    Coordinator::new(options.clone())?.invoke(ctx, message).await
}

#[cfg(all(test, feature = "tracing"))]
mod tests {
    use super::*;
    use crate::memory::InMemoryPersistence;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::span;
    use tracing::Subscriber;
    use tracing_subscriber::layer::{self, Layer};
    use tracing_subscriber::prelude::*;

    /// Collects every `id` value recorded on a span after creation.
    #[derive(Clone, Default)]
    struct RecordedIds(Arc<Mutex<Vec<String>>>);

    struct IdVisitor<'a>(&'a mut Vec<String>);

    impl Visit for IdVisitor<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "id" {
                self.0.push(value.to_string());
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "id" {
                self.0.push(format!("{value:?}"));
            }
        }
    }

    impl<S: Subscriber> Layer<S> for RecordedIds {
        fn on_record(
            &self,
            _span: &span::Id,
            values: &span::Record<'_>,
            _ctx: layer::Context<'_, S>,
        ) {
            let mut ids = self.0.lock().unwrap();
            values.record(&mut IdVisitor(&mut *ids));
        }
    }

    #[tokio::test]
    async fn test_invoke_span_carries_identity() {
        let recorded = RecordedIds::default();
        let _guard = tracing_subscriber::registry()
            .with(recorded.clone())
            .set_default();

        let options = Options::new()
            .with_worker_seconds(30)
            .with_retention_seconds(3600)
            .with_id_fn(|order: &String| Ok(order.clone()))
            .with_persistence(Arc::new(InMemoryPersistence::new("orders")));
        let coordinator = Coordinator::new(options).unwrap();

        coordinator
            .invoke_with(&Context::new(), "msg-1".to_string(), |_ctx, _order| async {
                Ok::<_, Error>(())
            })
            .await
            .unwrap();

        assert_eq!(*recorded.0.lock().unwrap(), vec!["msg-1".to_string()]);
    }
}

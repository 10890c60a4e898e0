//! mqdedup - exactly-once effects on top of at-least-once message queues
//!
//! Queues redeliver: sometimes while a previous delivery is still being
//! processed, sometimes long after it completed. mqdedup derives a stable
//! identity for each message, atomically claims it in a shared store, runs your
//! worker, and records the outcome so that duplicate deliveries are
//! short-circuited instead of reprocessed.
//!
//! Per identity the store holds at most one record:
//!
//! - absent: never processed, or its record expired
//! - consuming: a worker holds the claim for `worker_seconds`
//! - consumed: processed, duplicates are skipped for `retention_seconds`
//!
//! A delivery that finds the message still consuming fails with
//! [`Error::StillConsuming`]; hand it back to the queue for redelivery.
//!
//! # Example
//!
//! ```no_run
//! use mqdedup::{Context, Coordinator, DynamoDbPersistence, Error, Options};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Order {
//!     id: String,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize AWS DynamoDB client
//! let aws_config = aws_config::load_from_env().await;
//! let dynamodb_client = aws_sdk_dynamodb::Client::new(&aws_config);
//!
//! // Create persistence layer, namespaced by topic
//! let persistence = Arc::new(DynamoDbPersistence::new(
//!     dynamodb_client,
//!     "mqdedup".to_string(),
//!     "orders".to_string(),
//! ));
//!
//! let coordinator = Coordinator::new(
//!     Options::new()
//!         .with_worker_seconds(30)
//!         .with_retention_seconds(3600)
//!         .with_id_fn(|order: &Order| Ok(order.id.clone()))
//!         .with_worker(|_ctx: Context, order: Order| async move {
//!             // Your processing logic here
//!             println!("processing {}", order.id);
//!             Ok::<_, Error>(())
//!         })
//!         .with_persistence(persistence),
//! )?;
//!
//! let order = Order { id: "msg-1".to_string() };
//! match coordinator.invoke(&Context::new(), order).await {
//!     Ok(()) => { /* ack */ }
//!     Err(err) if err.is_still_consuming() => { /* nack, let the queue redeliver */ }
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod coordinator;
pub mod dynamodb;
pub mod error;
pub mod memory;
pub mod model;
pub mod options;
pub mod persistence;

// Re-export commonly used types
pub use context::Context;
pub use coordinator::{invoke, Coordinator};
pub use dynamodb::DynamoDbPersistence;
pub use error::{BoxError, Error, Operation};
pub use memory::InMemoryPersistence;
pub use model::{
    ConsumeStatus, Config, Expiration, Record, DEFAULT_MAX_CLAIM_ATTEMPTS, MAX_TTL_SECONDS,
};
pub use mqdedup_macros::deduplicate;
pub use options::{IdFn, Options, WorkerFn};
pub use persistence::{record_key, Persistence};

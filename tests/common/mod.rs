#![allow(dead_code)]

use async_trait::async_trait;
use mqdedup::{ConsumeStatus, Context, Error, InMemoryPersistence, Persistence};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// In-memory store with switchable failures and call counters.
#[derive(Debug, Default)]
pub struct FaultyPersistence {
    pub inner: InMemoryPersistence,
    pub fail_mark_consuming: AtomicBool,
    pub fail_mark_consumed: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Claims to report as contended while leaving no record behind, as if
    /// the record expired between the claim and the read.
    pub vanishing_claims: AtomicU32,
    pub calls: AtomicU32,
}

impl FaultyPersistence {
    pub fn new(topic: &str) -> Self {
        Self {
            inner: InMemoryPersistence::new(topic),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, flag: &AtomicBool) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for FaultyPersistence {
    async fn mark_consuming(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<bool, Error> {
        self.enter(&self.fail_mark_consuming)?;
        let vanished = self
            .vanishing_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if vanished {
            return Ok(false);
        }
        self.inner.mark_consuming(ctx, id, ttl).await
    }

    async fn mark_consumed(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<(), Error> {
        self.enter(&self.fail_mark_consumed)?;
        self.inner.mark_consumed(ctx, id, ttl).await
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<ConsumeStatus, Error> {
        self.enter(&self.fail_get)?;
        self.inner.get(ctx, id).await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        self.enter(&self.fail_delete)?;
        self.inner.delete(ctx, id).await
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub body: String,
}

impl Message {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            body: format!("payload of {id}"),
        }
    }
}

pub fn message_id(message: &Message) -> Result<String, Error> {
    if message.id.is_empty() {
        return Err(Error::InvalidMessage("message without id".to_string()));
    }
    Ok(message.id.clone())
}

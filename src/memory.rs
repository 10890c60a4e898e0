use crate::context::Context;
use crate::error::Error;
use crate::model::{ConsumeStatus, Record};
use crate::persistence::{record_key, Persistence};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// In-process persistence implementation.
///
/// Expired records are treated as absent. They are pruned on every write, so
/// the map holds at most the identities still inside their window. Only
/// coordinates invocations within one process.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    topic: String,
    records: Mutex<HashMap<String, Record>>,
}

impl InMemoryPersistence {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> Result<usize, Error> {
        let records = self.lock()?;
        Ok(records.values().filter(|r| !r.is_expired()).count())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Record>>, Error> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("in-memory persistence lock poisoned".to_string()))
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn mark_consuming(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<bool, Error> {
        ctx.check()?;
        let mut records = self.lock()?;
        let key = record_key(&self.topic, id);

        if records.get(&key).is_some_and(|r| !r.is_expired()) {
            return Ok(false);
        }
        let record = Record::new(ConsumeStatus::Consuming, ttl)?;
        records.retain(|_, r| !r.is_expired());
        records.insert(key, record);
        Ok(true)
    }

    async fn mark_consumed(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<(), Error> {
        ctx.check()?;
        let record = Record::new(ConsumeStatus::Consumed, ttl)?;
        let mut records = self.lock()?;
        records.retain(|_, r| !r.is_expired());
        records.insert(record_key(&self.topic, id), record);
        Ok(())
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<ConsumeStatus, Error> {
        ctx.check()?;
        let mut records = self.lock()?;
        let key = record_key(&self.topic, id);

        let live = records
            .get(&key)
            .filter(|r| !r.is_expired())
            .map(|r| r.status);

        match live {
            Some(status) => Ok(status),
            None => {
                records.remove(&key);
                Err(Error::NotFound { id: id.to_string() })
            }
        }
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        ctx.check()?;
        self.lock()?.remove(&record_key(&self.topic, id));
        Ok(())
    }
}

use crate::context::Context;
use crate::error::Error;
use crate::model::ConsumeStatus;
use crate::persistence::{record_key, Persistence};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ID: &str = "id";
const STATUS: &str = "status";
const EXPIRES_ON: &str = "expiresOn";

/// DynamoDB-backed persistence implementation
///
/// The table needs a string hash key named `id`. Enable TTL on `expiresOn` so
/// DynamoDB reaps old records; until it does, expired items are read as absent.
pub struct DynamoDbPersistence {
    client: Client,
    table_name: String,
    topic: String,
}

impl DynamoDbPersistence {
    pub fn new(client: Client, table_name: String, topic: String) -> Self {
        Self {
            client,
            table_name,
            topic,
        }
    }

    fn key(&self, id: &str) -> AttributeValue {
        AttributeValue::S(record_key(&self.topic, id))
    }

    fn item(
        &self,
        id: &str,
        status: ConsumeStatus,
        expires_on: u64,
    ) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (ID.to_string(), self.key(id)),
            (STATUS.to_string(), AttributeValue::N(status.tag().to_string())),
            (EXPIRES_ON.to_string(), AttributeValue::N(expires_on.to_string())),
        ])
    }
}

#[async_trait]
impl Persistence for DynamoDbPersistence {
    async fn mark_consuming(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<bool, Error> {
        ctx.run(async {
            let now = epoch_seconds(SystemTime::now())?;
            let expires_on = now
                .checked_add(ttl.as_secs())
                .ok_or_else(|| ttl_out_of_range(ttl))?;

            let result = self
                .client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(self.item(id, ConsumeStatus::Consuming, expires_on)))
                .condition_expression("attribute_not_exists(#id) OR #expiresOn <= :now")
                .expression_attribute_names("#id", ID)
                .expression_attribute_names("#expiresOn", EXPIRES_ON)
                .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
                .send()
                .await;

            match result {
                Ok(_) => Ok(true),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
                {
                    Ok(false)
                }
                Err(err) => Err(Error::DynamoDb(err.to_string())),
            }
        })
        .await
    }

    async fn mark_consumed(&self, ctx: &Context, id: &str, ttl: Duration) -> Result<(), Error> {
        ctx.run(async {
            let expires_at = SystemTime::now()
                .checked_add(ttl)
                .ok_or_else(|| ttl_out_of_range(ttl))?;
            let expires_on = epoch_seconds(expires_at)?;

            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(self.item(id, ConsumeStatus::Consumed, expires_on)))
                .send()
                .await?;

            Ok::<_, Error>(())
        })
        .await
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<ConsumeStatus, Error> {
        ctx.run(async {
            let result = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key(ID, self.key(id))
                .consistent_read(true)
                .send()
                .await?;

            let not_found = || Error::NotFound { id: id.to_string() };
            let item = result.item.filter(|i| !i.is_empty()).ok_or_else(not_found)?;
            let (status, expires_on) = decode_record(item)?;

            if expires_on <= epoch_seconds(SystemTime::now())? {
                return Err(not_found());
            }
            Ok(status)
        })
        .await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        ctx.run(async {
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key(ID, self.key(id))
                .send()
                .await?;

            Ok::<_, Error>(())
        })
        .await
    }
}

fn epoch_seconds(time: SystemTime) -> Result<u64, Error> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| Error::Internal(e.to_string()))
}

fn ttl_out_of_range(ttl: Duration) -> Error {
    Error::Config(format!("ttl out of range: {ttl:?}"))
}

/// Decode a DynamoDB item into its status and expiry (epoch seconds)
fn decode_record(
    mut attributes: HashMap<String, AttributeValue>,
) -> Result<(ConsumeStatus, u64), Error> {
    let tag = attributes
        .remove(STATUS)
        .and_then(|v| v.as_n().ok().and_then(|s| s.parse::<u8>().ok()))
        .ok_or_else(|| Error::Decoding("Missing or invalid 'status' field".to_string()))?;
    let status = ConsumeStatus::try_from(tag)?;

    let expires_on = attributes
        .remove(EXPIRES_ON)
        .and_then(|v| v.as_n().ok().and_then(|s| s.parse::<u64>().ok()))
        .ok_or_else(|| Error::Decoding("Missing or invalid 'expiresOn' field".to_string()))?;

    Ok((status, expires_on))
}

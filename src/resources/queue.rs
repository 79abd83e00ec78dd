//! Encrypted message queue.

use crate::core::builder::StackBuilder;
use crate::core::template::{props, Declaration, RemovalPolicy, Value};
use crate::core::types::{Component, QueueConfig};

pub const QUEUE_ID: &str = "AppQueue";

/// Platform-managed key for queue encryption.
pub const MANAGED_KEY_ALIAS: &str = "alias/aws/sqs";

const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Debug, Clone)]
pub struct QueueHandle {
    pub id: String,
}

impl QueueHandle {
    /// `Ref` of a queue resolves to its URL.
    pub fn url(&self) -> Value {
        Value::reference(&self.id)
    }

    pub fn arn(&self) -> Value {
        Value::get_att(&self.id, "Arn")
    }
}

pub fn declare(b: &mut StackBuilder, cfg: &QueueConfig) -> Result<QueueHandle, String> {
    let id = b.declare(
        Declaration::new(QUEUE_ID, "AWS::SQS::Queue", Component::Queue)
            .with_props(props([
                ("KmsMasterKeyId", MANAGED_KEY_ALIAS.into()),
                ("VisibilityTimeout", cfg.visibility_timeout_seconds.into()),
                (
                    "MessageRetentionPeriod",
                    (cfg.retention_days * SECONDS_PER_DAY).into(),
                ),
            ]))
            .removal(RemovalPolicy::Delete),
    )?;
    Ok(QueueHandle { id })
}

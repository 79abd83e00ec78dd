//! Least-privilege grants. Every statement names the specific resources it
//! covers; there is no way to build a statement over `*`.

use super::queue::QueueHandle;
use super::secret::SecretHandle;
use super::storage::BucketHandle;
use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, Value};
use crate::core::types::Component;

pub const POLICY_VERSION: &str = "2012-10-17";

const BUCKET_READ_WRITE: &[&str] = &[
    "s3:Abort*",
    "s3:DeleteObject*",
    "s3:GetBucket*",
    "s3:GetObject*",
    "s3:List*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
];

const QUEUE_SEND: &[&str] = &[
    "sqs:GetQueueAttributes",
    "sqs:GetQueueUrl",
    "sqs:SendMessage",
];

const SECRET_READ: &[&str] = &["secretsmanager:DescribeSecret", "secretsmanager:GetSecretValue"];

const LOG_WRITE: &[&str] = &["logs:CreateLogStream", "logs:PutLogEvents"];

/// One allow statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub actions: Vec<&'static str>,
    pub resources: Vec<Value>,
}

impl Statement {
    fn new(actions: &[&'static str], resources: Vec<Value>) -> Self {
        Self {
            actions: actions.to_vec(),
            resources,
        }
    }

    pub fn to_value(&self) -> Value {
        let action = match self.actions.as_slice() {
            [single] => Value::str(*single),
            many => Value::List(many.iter().map(|a| Value::str(*a)).collect()),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            many => Value::List(many.to_vec()),
        };
        map([
            ("Action", action),
            ("Effect", "Allow".into()),
            ("Resource", resource),
        ])
    }
}

/// Read/write on the bucket and its objects.
pub fn bucket_read_write(bucket: &BucketHandle) -> Statement {
    Statement::new(BUCKET_READ_WRITE, vec![bucket.arn(), bucket.objects_arn()])
}

/// Send-only on the queue.
pub fn queue_send(queue: &QueueHandle) -> Statement {
    Statement::new(QUEUE_SEND, vec![queue.arn()])
}

/// Read-only on the secret.
pub fn secret_read(secret: &SecretHandle) -> Statement {
    Statement::new(SECRET_READ, vec![secret.arn()])
}

/// Write to one log group.
pub fn log_write(log_group_id: &str) -> Statement {
    Statement::new(LOG_WRITE, vec![Value::get_att(log_group_id, "Arn")])
}

/// Role assumable by container tasks.
pub fn task_role(id: &str, component: Component) -> Declaration {
    Declaration::new(id, "AWS::IAM::Role", component).prop(
        "AssumeRolePolicyDocument",
        map([
            (
                "Statement",
                Value::List(vec![map([
                    ("Action", "sts:AssumeRole".into()),
                    ("Effect", "Allow".into()),
                    (
                        "Principal",
                        map([("Service", "ecs-tasks.amazonaws.com".into())]),
                    ),
                ])]),
            ),
            ("Version", POLICY_VERSION.into()),
        ]),
    )
}

/// Attach an inline policy to a role. Returns the policy's logical id.
pub fn attach_policy(
    b: &mut StackBuilder,
    role_id: &str,
    component: Component,
    statements: &[Statement],
) -> Result<String, String> {
    if statements.is_empty() {
        return Err(format!("policy for '{}' has no statements", role_id));
    }
    let policy_id = format!("{}DefaultPolicy", role_id);
    b.declare(
        Declaration::new(&policy_id, "AWS::IAM::Policy", component).with_props(props([
            (
                "PolicyDocument",
                map([
                    (
                        "Statement",
                        Value::List(statements.iter().map(Statement::to_value).collect()),
                    ),
                    ("Version", POLICY_VERSION.into()),
                ]),
            ),
            ("PolicyName", Value::str(&policy_id)),
            ("Roles", Value::List(vec![Value::reference(role_id)])),
        ])),
    )
}

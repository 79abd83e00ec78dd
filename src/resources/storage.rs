//! Private document bucket.

use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, RemovalPolicy, Value};
use crate::core::types::{Component, StorageConfig};

pub const BUCKET_ID: &str = "DocumentsBucket";

#[derive(Debug, Clone)]
pub struct BucketHandle {
    pub id: String,
}

impl BucketHandle {
    pub fn name(&self) -> Value {
        Value::reference(&self.id)
    }

    pub fn arn(&self) -> Value {
        Value::get_att(&self.id, "Arn")
    }

    /// ARN pattern covering every object in this bucket (and only this bucket).
    pub fn objects_arn(&self) -> Value {
        Value::join("", vec![self.arn(), "/*".into()])
    }
}

/// Encrypted, versioned, fully private bucket with an expiration rule.
/// The bucket outlives the stack.
pub fn declare(b: &mut StackBuilder, cfg: &StorageConfig) -> Result<BucketHandle, String> {
    let id = b.declare(
        Declaration::new(BUCKET_ID, "AWS::S3::Bucket", Component::ObjectStore)
            .with_props(props([
                ("BucketName", Value::str(&cfg.bucket_name)),
                (
                    "BucketEncryption",
                    map([(
                        "ServerSideEncryptionConfiguration",
                        Value::List(vec![map([(
                            "ServerSideEncryptionByDefault",
                            map([("SSEAlgorithm", "AES256".into())]),
                        )])]),
                    )]),
                ),
                (
                    "PublicAccessBlockConfiguration",
                    map([
                        ("BlockPublicAcls", true.into()),
                        ("BlockPublicPolicy", true.into()),
                        ("IgnorePublicAcls", true.into()),
                        ("RestrictPublicBuckets", true.into()),
                    ]),
                ),
                (
                    "VersioningConfiguration",
                    map([("Status", "Enabled".into())]),
                ),
                (
                    "LifecycleConfiguration",
                    map([(
                        "Rules",
                        Value::List(vec![map([
                            ("ExpirationInDays", cfg.expiration_days.into()),
                            ("Status", "Enabled".into()),
                        ])]),
                    )]),
                ),
            ]))
            .removal(RemovalPolicy::Retain),
    )?;
    tracing::info!(bucket = %cfg.bucket_name, "object store declared");
    Ok(BucketHandle { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn declare_default() -> crate::core::template::Template {
        let mut b = StackBuilder::new("t", IndexMap::new());
        declare(&mut b, &StorageConfig::default()).unwrap();
        b.finish()
    }

    #[test]
    fn test_bucket_is_private_and_retained() {
        let t = declare_default();
        let bucket = &t.resources[BUCKET_ID];
        let block = &bucket.properties["PublicAccessBlockConfiguration"];
        for key in [
            "BlockPublicAcls",
            "BlockPublicPolicy",
            "IgnorePublicAcls",
            "RestrictPublicBuckets",
        ] {
            assert_eq!(block.get(key), Some(&Value::Bool(true)), "{}", key);
        }
        assert_eq!(bucket.deletion_policy, Some(RemovalPolicy::Retain));
        assert_eq!(bucket.update_replace_policy, Some(RemovalPolicy::Retain));
    }

    #[test]
    fn test_bucket_versioned_and_expiring() {
        let t = declare_default();
        let bucket = &t.resources[BUCKET_ID];
        assert_eq!(
            bucket.properties["VersioningConfiguration"].get("Status"),
            Some(&Value::str("Enabled"))
        );
        let rules = bucket.properties["LifecycleConfiguration"]
            .get("Rules")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(rules[0].get("ExpirationInDays"), Some(&Value::Int(90)));
    }

    #[test]
    fn test_objects_arn_scoped_to_bucket() {
        let handle = BucketHandle {
            id: BUCKET_ID.to_string(),
        };
        let json = serde_json::to_value(handle.objects_arn()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Fn::Join": ["", [{"Fn::GetAtt": [BUCKET_ID, "Arn"]}, "/*"]]})
        );
    }
}

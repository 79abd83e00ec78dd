//! Generated database credentials.

use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, RemovalPolicy, Value};
use crate::core::types::{Component, SecretConfig};

pub const SECRET_ID: &str = "DBCredentials";

/// Key of the generated field.
pub const PASSWORD_KEY: &str = "password";

/// Key of the fixed template field.
pub const USERNAME_KEY: &str = "username";

#[derive(Debug, Clone)]
pub struct SecretHandle {
    pub id: String,
}

impl SecretHandle {
    /// `Ref` of a secret resolves to its ARN.
    pub fn arn(&self) -> Value {
        Value::reference(&self.id)
    }

    /// Dynamic reference resolved by the platform at deploy time.
    pub fn resolve_field(&self, key: &str) -> Value {
        Value::join(
            "",
            vec![
                "{{resolve:secretsmanager:".into(),
                self.arn(),
                Value::str(format!(":SecretString:{}::}}}}", key)),
            ],
        )
    }

    /// Container secret source for one JSON field.
    pub fn field_source(&self, key: &str) -> Value {
        Value::join(":", vec![self.arn(), Value::str(key), "".into(), "".into()])
    }
}

/// Declare the credential pair: fixed username, generated password
/// without punctuation or spaces.
pub fn declare(b: &mut StackBuilder, cfg: &SecretConfig) -> Result<SecretHandle, String> {
    let template = serde_json::json!({ USERNAME_KEY: cfg.username }).to_string();
    let id = b.declare(
        Declaration::new(SECRET_ID, "AWS::SecretsManager::Secret", Component::Secret)
            .with_props(props([
                ("Name", Value::str(&cfg.name)),
                (
                    "GenerateSecretString",
                    map([
                        ("SecretStringTemplate", Value::str(template)),
                        ("GenerateStringKey", PASSWORD_KEY.into()),
                        ("ExcludePunctuation", true.into()),
                        ("IncludeSpace", false.into()),
                    ]),
                ),
            ]))
            .removal(RemovalPolicy::Delete),
    )?;
    Ok(SecretHandle { id })
}

/// Bind the secret to the database cluster it describes.
pub fn attach_to_cluster(
    b: &mut StackBuilder,
    secret: &SecretHandle,
    cluster_id: &str,
) -> Result<String, String> {
    b.declare(
        Declaration::new(
            &format!("{}Attachment", secret.id),
            "AWS::SecretsManager::SecretTargetAttachment",
            Component::Secret,
        )
        .with_props(props([
            ("SecretId", secret.arn()),
            ("TargetId", Value::reference(cluster_id)),
            ("TargetType", "AWS::RDS::DBCluster".into()),
        ])),
    )
}

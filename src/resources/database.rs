//! Serverless relational database cluster: one writer, one reader that
//! scales with the writer, credentials from the generated secret.

use super::network::{self, NetworkHandle};
use super::secret::{self, SecretHandle, PASSWORD_KEY, USERNAME_KEY};
use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, RemovalPolicy, Value};
use crate::core::types::{Component, DatabaseConfig};

pub const CLUSTER_ID: &str = "AppDatabase";
pub const ENGINE: &str = "aurora-postgresql";
pub const INSTANCE_CLASS: &str = "db.serverless";

/// Bounds of the serverless capacity range, in capacity units.
pub const MIN_CAPACITY_FLOOR: f64 = 0.5;
pub const MAX_CAPACITY_CEILING: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct DatabaseHandle {
    pub cluster_id: String,
    pub security_group_id: String,
    pub writer_id: String,
    pub reader_id: String,
}

impl DatabaseHandle {
    pub fn endpoint_address(&self) -> Value {
        Value::get_att(&self.cluster_id, "Endpoint.Address")
    }

    /// The cluster's listener port (the engine default unless overridden).
    pub fn endpoint_port(&self) -> Value {
        Value::get_att(&self.cluster_id, "Endpoint.Port")
    }

    pub fn security_group(&self) -> Value {
        Value::get_att(&self.security_group_id, "GroupId")
    }
}

pub fn declare(
    b: &mut StackBuilder,
    cfg: &DatabaseConfig,
    net: &NetworkHandle,
    credentials: &SecretHandle,
) -> Result<DatabaseHandle, String> {
    let subnet_group = b.declare(
        Declaration::new(
            &format!("{}SubnetGroup", CLUSTER_ID),
            "AWS::RDS::DBSubnetGroup",
            Component::Database,
        )
        .with_props(props([
            (
                "DBSubnetGroupDescription",
                "Private subnets for the application database".into(),
            ),
            ("SubnetIds", net.private_subnet_refs()),
        ])),
    )?;

    let security_group_id = b.declare(network::security_group(
        &format!("{}SecurityGroup", CLUSTER_ID),
        "Application database",
        Component::Database,
        net,
        vec![],
        None,
    ))?;

    let cluster_id = b.declare(
        Declaration::new(CLUSTER_ID, "AWS::RDS::DBCluster", Component::Database)
            .with_props(props([
                ("Engine", ENGINE.into()),
                ("EngineVersion", Value::str(&cfg.engine_version)),
                ("DatabaseName", Value::str(&cfg.database_name)),
                ("Port", cfg.port.into()),
                ("DBSubnetGroupName", Value::reference(&subnet_group)),
                (
                    "VpcSecurityGroupIds",
                    Value::List(vec![Value::get_att(&security_group_id, "GroupId")]),
                ),
                ("MasterUsername", credentials.resolve_field(USERNAME_KEY)),
                ("MasterUserPassword", credentials.resolve_field(PASSWORD_KEY)),
                (
                    "ServerlessV2ScalingConfiguration",
                    map([
                        ("MinCapacity", cfg.min_capacity.into()),
                        ("MaxCapacity", cfg.max_capacity.into()),
                    ]),
                ),
                ("BackupRetentionPeriod", cfg.backup_retention_days.into()),
                ("StorageEncrypted", true.into()),
                ("CopyTagsToSnapshot", true.into()),
            ]))
            .removal(RemovalPolicy::Snapshot),
    )?;

    let writer_id = declare_instance(b, &cluster_id, "Writer", 0)?;
    // Promotion tiers 0-1 scale with the writer.
    let reader_id = declare_instance(b, &cluster_id, "Reader", 1)?;

    secret::attach_to_cluster(b, credentials, &cluster_id)?;

    tracing::info!(
        engine = ENGINE,
        version = %cfg.engine_version,
        min_capacity = cfg.min_capacity,
        max_capacity = cfg.max_capacity,
        "database cluster declared"
    );

    Ok(DatabaseHandle {
        cluster_id,
        security_group_id,
        writer_id,
        reader_id,
    })
}

fn declare_instance(
    b: &mut StackBuilder,
    cluster_id: &str,
    role: &str,
    promotion_tier: u32,
) -> Result<String, String> {
    b.declare(
        Declaration::new(
            &format!("{}{}", cluster_id, role),
            "AWS::RDS::DBInstance",
            Component::Database,
        )
        .with_props(props([
            ("DBClusterIdentifier", Value::reference(cluster_id)),
            ("DBInstanceClass", INSTANCE_CLASS.into()),
            ("Engine", ENGINE.into()),
            ("PromotionTier", promotion_tier.into()),
            ("PubliclyAccessible", false.into()),
        ]))
        .removal(RemovalPolicy::Delete),
    )
}

//! Explicit reachability between security groups.
//!
//! Load balancer to service on the container port, service to database on
//! the cluster's listener port. Nothing else is opened.

use super::database::DatabaseHandle;
use super::load_balancer::LoadBalancerHandle;
use super::service::ServiceHandle;
use crate::core::builder::StackBuilder;
use crate::core::template::{props, Declaration, Value};
use crate::core::types::Component;

/// A TCP port, literal or resolved from another record's attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Port {
    Number(u16),
    /// `(logical id, attribute)`, e.g. a database endpoint port
    Attribute(String, String),
}

impl Port {
    fn value(&self) -> Value {
        match self {
            Self::Number(n) => (*n).into(),
            Self::Attribute(id, attr) => Value::get_att(id, attr),
        }
    }

    /// Suffix used in rule logical ids.
    fn label(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Attribute(_, attr) => attr.replace('.', ""),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityHandle {
    pub rules: Vec<String>,
}

/// Allow `source` security group to reach `target` on `port`.
pub fn allow_ingress(
    b: &mut StackBuilder,
    target_sg: &str,
    source_sg: &str,
    port: &Port,
    description: &str,
) -> Result<String, String> {
    b.declare(
        Declaration::new(
            &format!("{}From{}{}", target_sg, source_sg, port.label()),
            "AWS::EC2::SecurityGroupIngress",
            Component::Connectivity,
        )
        .with_props(props([
            ("Description", Value::str(description)),
            ("FromPort", port.value()),
            ("GroupId", Value::get_att(target_sg, "GroupId")),
            ("IpProtocol", "tcp".into()),
            ("SourceSecurityGroupId", Value::get_att(source_sg, "GroupId")),
            ("ToPort", port.value()),
        ])),
    )
}

/// Allow `source` security group to send to `target` on `port`. Needed
/// when the source's egress is closed by default.
pub fn allow_egress(
    b: &mut StackBuilder,
    source_sg: &str,
    target_sg: &str,
    port: &Port,
    description: &str,
) -> Result<String, String> {
    b.declare(
        Declaration::new(
            &format!("{}To{}{}", source_sg, target_sg, port.label()),
            "AWS::EC2::SecurityGroupEgress",
            Component::Connectivity,
        )
        .with_props(props([
            ("Description", Value::str(description)),
            ("DestinationSecurityGroupId", Value::get_att(target_sg, "GroupId")),
            ("FromPort", port.value()),
            ("GroupId", Value::get_att(source_sg, "GroupId")),
            ("IpProtocol", "tcp".into()),
            ("ToPort", port.value()),
        ])),
    )
}

pub fn declare(
    b: &mut StackBuilder,
    lb: &LoadBalancerHandle,
    service: &ServiceHandle,
    database: &DatabaseHandle,
    container_port: u16,
) -> Result<ConnectivityHandle, String> {
    let app = Port::Number(container_port);
    let db = Port::Attribute(database.cluster_id.clone(), "Endpoint.Port".to_string());
    let rules = vec![
        allow_ingress(
            b,
            &service.security_group_id,
            &lb.security_group_id,
            &app,
            "Load balancer to target",
        )?,
        allow_egress(
            b,
            &lb.security_group_id,
            &service.security_group_id,
            &app,
            "Load balancer to target",
        )?,
        allow_ingress(
            b,
            &database.security_group_id,
            &service.security_group_id,
            &db,
            "Service to database",
        )?,
    ];
    tracing::debug!(rules = rules.len(), "connectivity declared");
    Ok(ConnectivityHandle { rules })
}

//! Application load balancer, target group and listener.

use super::network::{self, NetworkHandle};
use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, Value};
use crate::core::types::{Component, LoadBalancerConfig, TargetConfig};

pub const LOAD_BALANCER_ID: &str = "FleetALB";
pub const TARGET_GROUP_ID: &str = "FleetALBHttpListenerFleetTargetGroup";
pub const LISTENER_ID: &str = "FleetALBHttpListener";

/// Placeholder egress rule that matches no traffic; it replaces the
/// platform's allow-all default so every egress path is explicit.
fn closed_egress() -> Value {
    map([
        ("CidrIp", "255.255.255.255/32".into()),
        ("Description", "Disallow all traffic".into()),
        ("FromPort", 252u32.into()),
        ("IpProtocol", "icmp".into()),
        ("ToPort", 86u32.into()),
    ])
}

#[derive(Debug, Clone)]
pub struct LoadBalancerHandle {
    pub id: String,
    pub security_group_id: String,
    pub listener_port: u16,
    pub internet_facing: bool,
}

impl LoadBalancerHandle {
    pub fn dns_name(&self) -> Value {
        Value::get_att(&self.id, "DNSName")
    }

    pub fn security_group(&self) -> Value {
        Value::get_att(&self.security_group_id, "GroupId")
    }
}

#[derive(Debug, Clone)]
pub struct TargetHandle {
    pub target_group_id: String,
    pub listener_id: String,
    pub port: u16,
}

/// Declare the load balancer. An internet-facing one sits in the public
/// subnets, open to all sources on the listener port; an internal one sits
/// in the private subnets and admits only the VPC's own block.
pub fn declare(
    b: &mut StackBuilder,
    cfg: &LoadBalancerConfig,
    net: &NetworkHandle,
) -> Result<LoadBalancerHandle, String> {
    let (source, description) = if cfg.internet_facing {
        (
            Value::str("0.0.0.0/0"),
            format!("Allow from anyone on port {}", cfg.listener_port),
        )
    } else {
        (
            net.vpc_cidr(),
            format!("Allow from within the VPC on port {}", cfg.listener_port),
        )
    };
    let listener_ingress = map([
        ("CidrIp", source),
        ("Description", Value::str(description)),
        ("FromPort", cfg.listener_port.into()),
        ("IpProtocol", "tcp".into()),
        ("ToPort", cfg.listener_port.into()),
    ]);
    let security_group_id = b.declare(network::security_group(
        &format!("{}SecurityGroup", LOAD_BALANCER_ID),
        "Application load balancer",
        Component::LoadBalancer,
        net,
        vec![listener_ingress],
        Some(vec![closed_egress()]),
    ))?;

    let (scheme, subnets) = if cfg.internet_facing {
        ("internet-facing", net.public_subnet_refs())
    } else {
        ("internal", net.private_subnet_refs())
    };
    let mut decl = Declaration::new(
        LOAD_BALANCER_ID,
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        Component::LoadBalancer,
    )
    .with_props(props([
        (
            "LoadBalancerAttributes",
            Value::List(vec![map([
                ("Key", "deletion_protection.enabled".into()),
                ("Value", "false".into()),
            ])]),
        ),
        ("Scheme", scheme.into()),
        (
            "SecurityGroups",
            Value::List(vec![Value::get_att(&security_group_id, "GroupId")]),
        ),
        ("Subnets", subnets),
        ("Type", "application".into()),
    ]));
    if cfg.internet_facing {
        for route in &net.public_routes {
            decl = decl.depends_on(route);
        }
    }
    let id = b.declare(decl)?;

    Ok(LoadBalancerHandle {
        id,
        security_group_id,
        listener_port: cfg.listener_port,
        internet_facing: cfg.internet_facing,
    })
}

/// Declare the service's target group and the listener forwarding to it.
pub fn declare_target(
    b: &mut StackBuilder,
    cfg: &TargetConfig,
    lb: &LoadBalancerHandle,
    net: &NetworkHandle,
    port: u16,
) -> Result<TargetHandle, String> {
    let target_group_id = b.declare(
        Declaration::new(
            TARGET_GROUP_ID,
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            Component::LoadBalancer,
        )
        .with_props(props([
            ("HealthCheckIntervalSeconds", cfg.interval_seconds.into()),
            ("HealthCheckPath", Value::str(&cfg.health_check_path)),
            ("HealthCheckProtocol", "HTTP".into()),
            ("HealthCheckTimeoutSeconds", cfg.timeout_seconds.into()),
            ("HealthyThresholdCount", cfg.healthy_threshold.into()),
            ("Port", port.into()),
            ("Protocol", "HTTP".into()),
            (
                "TargetGroupAttributes",
                Value::List(vec![
                    map([
                        ("Key", "deregistration_delay.timeout_seconds".into()),
                        ("Value", Value::str(cfg.deregistration_delay_seconds.to_string())),
                    ]),
                    map([
                        ("Key", "stickiness.enabled".into()),
                        ("Value", "false".into()),
                    ]),
                ]),
            ),
            ("TargetType", "ip".into()),
            ("UnhealthyThresholdCount", cfg.unhealthy_threshold.into()),
            ("VpcId", net.vpc()),
        ])),
    )?;

    let listener_id = b.declare(
        Declaration::new(
            LISTENER_ID,
            "AWS::ElasticLoadBalancingV2::Listener",
            Component::LoadBalancer,
        )
        .with_props(props([
            (
                "DefaultActions",
                Value::List(vec![map([
                    ("TargetGroupArn", Value::reference(&target_group_id)),
                    ("Type", "forward".into()),
                ])]),
            ),
            ("LoadBalancerArn", Value::reference(&lb.id)),
            ("Port", lb.listener_port.into()),
            ("Protocol", "HTTP".into()),
        ])),
    )?;

    tracing::info!(
        listener_port = lb.listener_port,
        target_port = port,
        path = %cfg.health_check_path,
        "listener and target group declared"
    );

    Ok(TargetHandle {
        target_group_id,
        listener_id,
        port,
    })
}

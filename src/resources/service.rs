//! Container service: replicas of the task definition in the private
//! subnets, registered with the load balancer's target group.

use super::compute::{ClusterHandle, TaskHandle};
use super::load_balancer::TargetHandle;
use super::network::{self, NetworkHandle};
use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, Value};
use crate::core::types::{Component, ServiceConfig};

pub const SERVICE_ID: &str = "FleetService";

#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub id: String,
    pub security_group_id: String,
}

impl ServiceHandle {
    pub fn security_group(&self) -> Value {
        Value::get_att(&self.security_group_id, "GroupId")
    }
}

/// Declare the service and its security group. The group starts with no
/// ingress; connectivity rules are added afterwards.
pub fn declare(
    b: &mut StackBuilder,
    cfg: &ServiceConfig,
    net: &NetworkHandle,
    cluster: &ClusterHandle,
    task: &TaskHandle,
    target: &TargetHandle,
) -> Result<ServiceHandle, String> {
    let security_group_id = b.declare(network::security_group(
        &format!("{}SecurityGroup", SERVICE_ID),
        "Container service",
        Component::Service,
        net,
        vec![],
        None,
    ))?;

    let id = b.declare(
        Declaration::new(SERVICE_ID, "AWS::ECS::Service", Component::Service)
            .with_props(props([
                ("Cluster", Value::reference(&cluster.id)),
                (
                    "DeploymentConfiguration",
                    map([
                        ("MaximumPercent", 200u32.into()),
                        ("MinimumHealthyPercent", 50u32.into()),
                    ]),
                ),
                ("DesiredCount", cfg.desired_count.into()),
                ("EnableECSManagedTags", false.into()),
                (
                    "HealthCheckGracePeriodSeconds",
                    cfg.health_check_grace_seconds.into(),
                ),
                ("LaunchType", "FARGATE".into()),
                (
                    "LoadBalancers",
                    Value::List(vec![map([
                        ("ContainerName", Value::str(&task.container_name)),
                        ("ContainerPort", task.container_port.into()),
                        ("TargetGroupArn", Value::reference(&target.target_group_id)),
                    ])]),
                ),
                (
                    "NetworkConfiguration",
                    map([(
                        "AwsvpcConfiguration",
                        map([
                            ("AssignPublicIp", "DISABLED".into()),
                            (
                                "SecurityGroups",
                                Value::List(vec![Value::get_att(&security_group_id, "GroupId")]),
                            ),
                            ("Subnets", net.private_subnet_refs()),
                        ]),
                    )]),
                ),
                ("TaskDefinition", Value::reference(&task.task_definition_id)),
            ]))
            .depends_on(&target.listener_id)
            .depends_on(&task.task_policy_id)
            .depends_on(&task.task_role_id),
    )?;

    tracing::info!(
        desired_count = cfg.desired_count,
        grace_seconds = cfg.health_check_grace_seconds,
        "service declared"
    );

    Ok(ServiceHandle {
        id,
        security_group_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::define_stack;
    use crate::core::template::Template;
    use crate::core::types::StackConfig;

    fn reference_stack() -> Template {
        define_stack(&StackConfig::minimal("fleet", "dev")).unwrap()
    }

    fn awsvpc(t: &Template) -> &Value {
        t.resources[SERVICE_ID].properties["NetworkConfiguration"]
            .get("AwsvpcConfiguration")
            .unwrap()
    }

    #[test]
    fn test_two_replicas_with_grace() {
        let t = reference_stack();
        let svc = &t.resources[SERVICE_ID];
        assert_eq!(svc.properties["DesiredCount"], Value::Int(2));
        assert_eq!(svc.properties["HealthCheckGracePeriodSeconds"], Value::Int(60));
        assert_eq!(svc.properties["LaunchType"], Value::str("FARGATE"));
    }

    #[test]
    fn test_private_subnets_without_public_ip() {
        let t = reference_stack();
        let cfg = awsvpc(&t);
        assert_eq!(cfg.get("AssignPublicIp"), Some(&Value::str("DISABLED")));
        assert_eq!(
            cfg.get("Subnets").unwrap().references(),
            vec!["FleetVPCPrivateSubnet1", "FleetVPCPrivateSubnet2"]
        );
    }

    #[test]
    fn test_registered_with_target_group() {
        let t = reference_stack();
        let svc = &t.resources[SERVICE_ID];
        let lbs = svc.properties["LoadBalancers"].as_list().unwrap();
        assert_eq!(lbs.len(), 1);
        assert_eq!(lbs[0].get("ContainerName"), Some(&Value::str("AppContainer")));
        assert_eq!(lbs[0].get("ContainerPort"), Some(&Value::Int(8080)));
        assert!(svc.depends_on.iter().any(|d| d == "FleetALBHttpListener"));
        assert!(svc
            .depends_on
            .iter()
            .any(|d| d == "ServiceTaskTaskRoleDefaultPolicy"));
    }
}

//! Structural audit of a synthesized template.
//!
//! Checks the least-privilege, placement and retention properties a stack
//! must hold regardless of how it was configured. Returns every finding
//! rather than stopping at the first (empty = clean).
//!
//! [`audit`] checks bounds only: a service with three replicas or a target
//! group probing `/healthz` passes. The exact reference values (two
//! replicas, `/actuator/health`, thresholds 2 and 3) are what an unset
//! field resolves to. [`audit_reference`] pins them for callers that want
//! a deviation reported, as `fleetstack audit --strict` does.

use super::template::{Declaration, RemovalPolicy, Template, Value};
use super::types::{ServiceConfig, TargetConfig};
use crate::resources::database::{MAX_CAPACITY_CEILING, MIN_CAPACITY_FLOOR};
use std::collections::HashSet;

/// Number of outputs every stack exports.
pub const EXPECTED_OUTPUTS: usize = 4;

/// One audit finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub check: &'static str,
    pub logical_id: String,
    pub detail: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.check, self.logical_id, self.detail)
    }
}

fn finding(check: &'static str, id: &str, detail: impl Into<String>) -> Finding {
    Finding {
        check,
        logical_id: id.to_string(),
        detail: detail.into(),
    }
}

/// Run every check.
pub fn audit(template: &Template) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_references(template, &mut findings);
    check_grants(template, &mut findings);
    check_buckets(template, &mut findings);
    check_database(template, &mut findings);
    check_service(template, &mut findings);
    check_targets(template, &mut findings);
    check_ingress(template, &mut findings);
    check_outputs(template, &mut findings);
    for f in &findings {
        tracing::warn!(check = f.check, resource = %f.logical_id, "{}", f.detail);
    }
    findings
}

fn check_references(t: &Template, out: &mut Vec<Finding>) {
    for (id, decl) in &t.resources {
        for dep in decl.dependencies() {
            if dep == *id {
                out.push(finding("dangling_reference", id, "references itself"));
            } else if !t.resources.contains_key(&dep) {
                out.push(finding(
                    "dangling_reference",
                    id,
                    format!("references undeclared '{}'", dep),
                ));
            }
        }
    }
    for (id, output) in &t.outputs {
        for dep in output.value.references() {
            if !t.resources.contains_key(dep) {
                out.push(finding(
                    "dangling_reference",
                    id,
                    format!("output references undeclared '{}'", dep),
                ));
            }
        }
    }
}

fn statement_resources(statement: &Value) -> Vec<&Value> {
    match statement.get("Resource") {
        Some(Value::List(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

fn check_grants(t: &Template, out: &mut Vec<Finding>) {
    for decl in t.of_type("AWS::IAM::Policy") {
        let statements = decl
            .properties
            .get("PolicyDocument")
            .and_then(|d| d.get("Statement"))
            .and_then(Value::as_list)
            .unwrap_or(&[]);
        if statements.is_empty() {
            out.push(finding("grant_scope", &decl.logical_id, "policy has no statements"));
        }
        for (i, statement) in statements.iter().enumerate() {
            let resources = statement_resources(statement);
            if resources.is_empty() {
                out.push(finding(
                    "grant_scope",
                    &decl.logical_id,
                    format!("statement {} names no resource", i),
                ));
            }
            for resource in resources {
                if let Some(s) = resource.as_str().filter(|s| s.contains('*')) {
                    out.push(finding(
                        "grant_scope",
                        &decl.logical_id,
                        format!("statement {} grants wildcard resource '{}'", i, s),
                    ));
                } else if resource.references().is_empty() {
                    out.push(finding(
                        "grant_scope",
                        &decl.logical_id,
                        format!("statement {} names a resource outside the stack", i),
                    ));
                }
            }
        }
    }
}

const PUBLIC_ACCESS_FLAGS: [&str; 4] = [
    "BlockPublicAcls",
    "BlockPublicPolicy",
    "IgnorePublicAcls",
    "RestrictPublicBuckets",
];

fn check_buckets(t: &Template, out: &mut Vec<Finding>) {
    for decl in t.of_type("AWS::S3::Bucket") {
        let block = decl.properties.get("PublicAccessBlockConfiguration");
        for flag in PUBLIC_ACCESS_FLAGS {
            if block.and_then(|b| b.get(flag)).and_then(Value::as_bool) != Some(true) {
                out.push(finding(
                    "public_access_block",
                    &decl.logical_id,
                    format!("{} is not enabled", flag),
                ));
            }
        }
        if decl.deletion_policy != Some(RemovalPolicy::Retain) {
            out.push(finding(
                "removal_policy",
                &decl.logical_id,
                "bucket is not retained on deletion",
            ));
        }
    }
}

fn check_database(t: &Template, out: &mut Vec<Finding>) {
    for decl in t.of_type("AWS::RDS::DBCluster") {
        let scaling = decl.properties.get("ServerlessV2ScalingConfiguration");
        let min = scaling.and_then(|s| s.get("MinCapacity")).and_then(Value::as_f64);
        let max = scaling.and_then(|s| s.get("MaxCapacity")).and_then(Value::as_f64);
        match (min, max) {
            (Some(min), Some(max))
                if MIN_CAPACITY_FLOOR <= min && min <= max && max <= MAX_CAPACITY_CEILING => {}
            (Some(min), Some(max)) => out.push(finding(
                "capacity_bounds",
                &decl.logical_id,
                format!(
                    "capacity [{}, {}] outside [{}, {}]",
                    min, max, MIN_CAPACITY_FLOOR, MAX_CAPACITY_CEILING
                ),
            )),
            _ => out.push(finding(
                "capacity_bounds",
                &decl.logical_id,
                "serverless capacity range is missing",
            )),
        }
        if decl.deletion_policy != Some(RemovalPolicy::Snapshot) {
            out.push(finding(
                "removal_policy",
                &decl.logical_id,
                "database is not snapshotted on deletion",
            ));
        }
    }
}

fn is_private_subnet(t: &Template, id: &str) -> bool {
    t.resources.get(id).is_some_and(|d| {
        d.resource_type == "AWS::EC2::Subnet"
            && d.properties.get("MapPublicIpOnLaunch").and_then(Value::as_bool) == Some(false)
    })
}

fn check_service(t: &Template, out: &mut Vec<Finding>) {
    for decl in t.of_type("AWS::ECS::Service") {
        let id = &decl.logical_id;
        match decl.properties.get("DesiredCount").and_then(Value::as_i64) {
            Some(n) if n >= 1 => {}
            _ => out.push(finding("service_placement", id, "desired count must be at least 1")),
        }
        let awsvpc = decl
            .properties
            .get("NetworkConfiguration")
            .and_then(|n| n.get("AwsvpcConfiguration"));
        if awsvpc.and_then(|a| a.get("AssignPublicIp")).and_then(Value::as_str) != Some("DISABLED")
        {
            out.push(finding("service_placement", id, "public IP assignment is not disabled"));
        }
        let subnets = awsvpc
            .and_then(|a| a.get("Subnets"))
            .map(Value::references)
            .unwrap_or_default();
        if subnets.is_empty() {
            out.push(finding("service_placement", id, "no subnets"));
        }
        for subnet in subnets {
            if !is_private_subnet(t, subnet) {
                out.push(finding(
                    "service_placement",
                    id,
                    format!("subnet '{}' is not private", subnet),
                ));
            }
        }
        if decl
            .properties
            .get("LoadBalancers")
            .and_then(Value::as_list)
            .map_or(true, <[Value]>::is_empty)
        {
            out.push(finding("service_placement", id, "not registered with a load balancer"));
        }
    }
}

fn check_targets(t: &Template, out: &mut Vec<Finding>) {
    for decl in t.of_type("AWS::ElasticLoadBalancingV2::TargetGroup") {
        let id = &decl.logical_id;
        match decl.properties.get("HealthCheckPath").and_then(Value::as_str) {
            Some(path) if path.starts_with('/') => {}
            _ => out.push(finding("target_health_check", id, "health check path missing")),
        }
        for key in ["HealthyThresholdCount", "UnhealthyThresholdCount"] {
            match decl.properties.get(key).and_then(Value::as_i64) {
                Some(n) if (2..=10).contains(&n) => {}
                _ => out.push(finding(
                    "target_health_check",
                    id,
                    format!("{} missing or outside 2..=10", key),
                )),
            }
        }
    }
}

/// Security groups fronting an internet-facing load balancer.
fn public_entry_groups(t: &Template) -> HashSet<&str> {
    t.of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
        .filter(|d| d.properties.get("Scheme").and_then(Value::as_str) == Some("internet-facing"))
        .filter_map(|d| d.properties.get("SecurityGroups"))
        .flat_map(Value::references)
        .collect()
}

fn has_source_group(source: Option<&Value>) -> bool {
    source.is_some_and(|v| !v.references().is_empty())
}

/// Security groups of internal load balancers. They may admit the VPC's
/// own block, since that traffic never leaves the network.
fn internal_entry_groups(t: &Template) -> HashSet<&str> {
    t.of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
        .filter(|d| d.properties.get("Scheme").and_then(Value::as_str) == Some("internal"))
        .filter_map(|d| d.properties.get("SecurityGroups"))
        .flat_map(Value::references)
        .collect()
}

/// `GetAtt <vpc>.CidrBlock` naming a VPC declared in the template.
fn is_vpc_block(t: &Template, source: Option<&Value>) -> bool {
    match source {
        Some(Value::GetAtt(id, attr)) if attr == "CidrBlock" => t
            .resources
            .get(id)
            .is_some_and(|d| d.resource_type == "AWS::EC2::VPC"),
        _ => false,
    }
}

fn check_ingress(t: &Template, out: &mut Vec<Finding>) {
    let public = public_entry_groups(t);
    let internal = internal_entry_groups(t);
    for decl in t.of_type("AWS::EC2::SecurityGroup") {
        let rules = decl
            .properties
            .get("SecurityGroupIngress")
            .and_then(Value::as_list)
            .unwrap_or(&[]);
        for rule in rules {
            let id = decl.logical_id.as_str();
            if has_source_group(rule.get("SourceSecurityGroupId"))
                || public.contains(id)
                || (internal.contains(id) && is_vpc_block(t, rule.get("CidrIp")))
            {
                continue;
            }
            out.push(finding(
                "open_ingress",
                &decl.logical_id,
                format!(
                    "ingress from {} is not security-group to security-group",
                    rule.get("CidrIp").and_then(Value::as_str).unwrap_or("unknown source")
                ),
            ));
        }
    }
    for decl in t.of_type("AWS::EC2::SecurityGroupIngress") {
        if !has_source_group(decl.properties.get("SourceSecurityGroupId")) {
            out.push(finding(
                "open_ingress",
                &decl.logical_id,
                "ingress rule has no source security group",
            ));
        }
    }
}

fn check_outputs(t: &Template, out: &mut Vec<Finding>) {
    if t.outputs.len() != EXPECTED_OUTPUTS {
        out.push(finding(
            "outputs",
            "Outputs",
            format!("expected {} outputs, found {}", EXPECTED_OUTPUTS, t.outputs.len()),
        ));
    }
    for (id, output) in &t.outputs {
        if output.export_name.trim().is_empty() {
            out.push(finding("outputs", id, "export name is empty"));
        }
    }
}

/// Compare service and target group settings to the reference values.
pub fn audit_reference(template: &Template) -> Vec<Finding> {
    let service = ServiceConfig::default();
    let target = TargetConfig::default();
    let mut findings = Vec::new();

    for decl in template.of_type("AWS::ECS::Service") {
        expect_int(decl, "DesiredCount", service.desired_count, &mut findings);
    }
    for decl in template.of_type("AWS::ElasticLoadBalancingV2::TargetGroup") {
        let path = decl.properties.get("HealthCheckPath").and_then(Value::as_str);
        if path != Some(target.health_check_path.as_str()) {
            findings.push(finding(
                "reference_values",
                &decl.logical_id,
                format!(
                    "HealthCheckPath is {:?}, expected '{}'",
                    path.unwrap_or_default(),
                    target.health_check_path
                ),
            ));
        }
        expect_int(decl, "HealthyThresholdCount", target.healthy_threshold, &mut findings);
        expect_int(decl, "UnhealthyThresholdCount", target.unhealthy_threshold, &mut findings);
    }
    for f in &findings {
        tracing::warn!(check = f.check, resource = %f.logical_id, "{}", f.detail);
    }
    findings
}

fn expect_int(decl: &Declaration, key: &str, expected: u32, out: &mut Vec<Finding>) {
    let actual = decl.properties.get(key).and_then(Value::as_i64);
    if actual != Some(i64::from(expected)) {
        out.push(finding(
            "reference_values",
            &decl.logical_id,
            format!("{} is {:?}, expected {}", key, actual, expected),
        ));
    }
}

/// Records reachable from the public internet: the internet-facing load
/// balancer and its security group.
pub fn public_entry_points(template: &Template) -> Vec<&Declaration> {
    let groups = public_entry_groups(template);
    template
        .resources
        .values()
        .filter(|d| {
            groups.contains(d.logical_id.as_str())
                || (d.resource_type == "AWS::ElasticLoadBalancingV2::LoadBalancer"
                    && d.properties.get("Scheme").and_then(Value::as_str)
                        == Some("internet-facing"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::define_stack;
    use crate::core::template::map;
    use crate::core::types::StackConfig;
    use crate::resources::load_balancer;

    fn reference() -> Template {
        define_stack(&StackConfig::minimal("fleet", "dev")).unwrap()
    }

    fn checks(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.check).collect()
    }

    #[test]
    fn test_reference_stack_is_clean() {
        assert!(audit(&reference()).is_empty());
    }

    #[test]
    fn test_wildcard_grant_flagged() {
        let mut t = reference();
        let policy = t
            .resources
            .get_mut("ServiceTaskTaskRoleDefaultPolicy")
            .unwrap();
        policy.properties.insert(
            "PolicyDocument".to_string(),
            map([(
                "Statement",
                Value::List(vec![map([
                    ("Action", "s3:*".into()),
                    ("Effect", "Allow".into()),
                    ("Resource", "*".into()),
                ])]),
            )]),
        );
        let findings = audit(&t);
        assert_eq!(checks(&findings), vec!["grant_scope"]);
        assert!(findings[0].detail.contains("wildcard"));
    }

    #[test]
    fn test_public_access_block_flagged() {
        let mut t = reference();
        let bucket = t.resources.get_mut("DocumentsBucket").unwrap();
        bucket.properties.shift_remove("PublicAccessBlockConfiguration");
        bucket.deletion_policy = Some(RemovalPolicy::Delete);
        let findings = audit(&t);
        assert_eq!(
            findings.iter().filter(|f| f.check == "public_access_block").count(),
            4
        );
        assert!(checks(&findings).contains(&"removal_policy"));
    }

    #[test]
    fn test_capacity_out_of_bounds_flagged() {
        let mut cfg = StackConfig::minimal("fleet", "dev");
        cfg.database.max_capacity = 4.0;
        let t = define_stack(&cfg).unwrap();
        let findings = audit(&t);
        assert_eq!(checks(&findings), vec!["capacity_bounds"]);
    }

    #[test]
    fn test_reference_values_hold_for_defaults() {
        assert!(audit_reference(&reference()).is_empty());
    }

    #[test]
    fn test_tuned_service_passes_bounds_but_not_reference() {
        let mut cfg = StackConfig::minimal("fleet", "dev");
        cfg.service.desired_count = 3;
        cfg.target.health_check_path = "/healthz".to_string();
        cfg.target.unhealthy_threshold = 5;
        let t = define_stack(&cfg).unwrap();

        assert!(audit(&t).is_empty());
        let strict = audit_reference(&t);
        assert_eq!(strict.len(), 3);
        assert!(strict.iter().all(|f| f.check == "reference_values"));
        assert_eq!(strict[0].logical_id, "FleetService");
        assert!(strict[0].detail.contains("expected 2"));
        assert!(strict[1].detail.contains("/actuator/health"));
        assert!(strict[2].detail.starts_with("UnhealthyThresholdCount"));
    }

    #[test]
    fn test_public_service_flagged() {
        let mut t = reference();
        let svc = t.resources.get_mut("FleetService").unwrap();
        svc.properties.insert(
            "NetworkConfiguration".to_string(),
            map([(
                "AwsvpcConfiguration",
                map([
                    ("AssignPublicIp", "ENABLED".into()),
                    ("Subnets", Value::list_of_refs(&["FleetVPCPublicSubnet1".to_string()])),
                ]),
            )]),
        );
        let findings = audit(&t);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.check == "service_placement"));
    }

    #[test]
    fn test_open_ingress_outside_load_balancer_flagged() {
        let mut t = reference();
        let sg = t.resources.get_mut("AppDatabaseSecurityGroup").unwrap();
        sg.properties.insert(
            "SecurityGroupIngress".to_string(),
            Value::List(vec![map([
                ("CidrIp", "0.0.0.0/0".into()),
                ("FromPort", 5432u32.into()),
                ("IpProtocol", "tcp".into()),
                ("ToPort", 5432u32.into()),
            ])]),
        );
        let findings = audit(&t);
        assert_eq!(checks(&findings), vec!["open_ingress"]);
        assert!(findings[0].detail.contains("0.0.0.0/0"));
    }

    #[test]
    fn test_internal_load_balancer_is_clean() {
        let mut cfg = StackConfig::minimal("fleet", "dev");
        cfg.load_balancer.internet_facing = false;
        let t = define_stack(&cfg).unwrap();
        assert!(audit(&t).is_empty());
        assert!(public_entry_points(&t).is_empty());
    }

    #[test]
    fn test_internal_load_balancer_may_not_be_open() {
        let mut cfg = StackConfig::minimal("fleet", "dev");
        cfg.load_balancer.internet_facing = false;
        let mut t = define_stack(&cfg).unwrap();
        let sg = t.resources.get_mut("FleetALBSecurityGroup").unwrap();
        sg.properties.insert(
            "SecurityGroupIngress".to_string(),
            Value::List(vec![map([
                ("CidrIp", "0.0.0.0/0".into()),
                ("FromPort", 80u32.into()),
                ("IpProtocol", "tcp".into()),
                ("ToPort", 80u32.into()),
            ])]),
        );
        let findings = audit(&t);
        assert_eq!(checks(&findings), vec!["open_ingress"]);
        assert_eq!(findings[0].logical_id, "FleetALBSecurityGroup");
    }

    #[test]
    fn test_missing_output_and_dangling_reference() {
        let mut t = reference();
        t.outputs.shift_remove("SQSQueueUrl");
        t.resources.shift_remove("AppQueue");
        let findings = audit(&t);
        assert!(checks(&findings).contains(&"outputs"));
        assert!(findings
            .iter()
            .any(|f| f.check == "dangling_reference" && f.detail.contains("AppQueue")));
    }

    #[test]
    fn test_target_health_check_flagged() {
        let mut t = reference();
        let tg = t
            .resources
            .get_mut(load_balancer::TARGET_GROUP_ID)
            .unwrap();
        tg.properties.shift_remove("HealthCheckPath");
        tg.properties
            .insert("HealthyThresholdCount".to_string(), Value::Int(1));
        let findings = audit(&t);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.check == "target_health_check"));
    }

    #[test]
    fn test_public_entry_points() {
        let t = reference();
        let ids: Vec<_> = public_entry_points(&t)
            .iter()
            .map(|d| d.logical_id.as_str())
            .collect();
        assert_eq!(ids, vec!["FleetALBSecurityGroup", "FleetALB"]);
    }

    #[test]
    fn test_finding_display() {
        let f = finding("outputs", "Outputs", "expected 4 outputs, found 3");
        assert_eq!(f.to_string(), "[outputs] Outputs: expected 4 outputs, found 3");
    }
}

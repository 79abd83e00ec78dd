//! Dependency-ordered stack builder.
//!
//! Records are declared in topological order: a declaration may only
//! reference logical ids that were declared before it. The builder rejects
//! duplicates and forward or dangling references at the point of
//! declaration, so a finished template never contains an unresolved
//! reference.

use super::template::{map, Declaration, Output, Template, Value};
use indexmap::IndexMap;

/// Resource types that accept a `Tags` list of `{Key, Value}` pairs.
const TAGGABLE: &[&str] = &[
    "AWS::EC2::VPC",
    "AWS::EC2::Subnet",
    "AWS::EC2::RouteTable",
    "AWS::EC2::InternetGateway",
    "AWS::EC2::EIP",
    "AWS::EC2::NatGateway",
    "AWS::EC2::SecurityGroup",
    "AWS::S3::Bucket",
    "AWS::SecretsManager::Secret",
    "AWS::RDS::DBSubnetGroup",
    "AWS::RDS::DBCluster",
    "AWS::RDS::DBInstance",
    "AWS::SQS::Queue",
    "AWS::ECS::Cluster",
    "AWS::ECS::TaskDefinition",
    "AWS::ECS::Service",
    "AWS::IAM::Role",
    "AWS::Logs::LogGroup",
    "AWS::ElasticLoadBalancingV2::LoadBalancer",
    "AWS::ElasticLoadBalancingV2::TargetGroup",
];

/// Whether a resource type carries tags.
pub fn supports_tags(resource_type: &str) -> bool {
    TAGGABLE.contains(&resource_type)
}

/// Accumulates declarations and outputs for one stack.
#[derive(Debug)]
pub struct StackBuilder {
    template: Template,
    tags: IndexMap<String, String>,
}

impl StackBuilder {
    pub fn new(description: &str, tags: IndexMap<String, String>) -> Self {
        Self {
            template: Template {
                description: description.to_string(),
                ..Template::default()
            },
            tags,
        }
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.template.resources.contains_key(logical_id)
    }

    pub fn len(&self) -> usize {
        self.template.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.template.resources.is_empty()
    }

    /// Declare a resource. Returns its logical id.
    pub fn declare(&mut self, mut decl: Declaration) -> Result<String, String> {
        if decl.logical_id.is_empty() {
            return Err("logical id must not be empty".to_string());
        }
        if !decl
            .logical_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(format!(
                "logical id '{}' must be alphanumeric",
                decl.logical_id
            ));
        }
        if self.contains(&decl.logical_id) {
            return Err(format!("'{}' is already declared", decl.logical_id));
        }
        for dep in decl.dependencies() {
            if dep == decl.logical_id {
                return Err(format!("'{}' references itself", decl.logical_id));
            }
            if !self.contains(&dep) {
                return Err(format!(
                    "'{}' references undeclared '{}'",
                    decl.logical_id, dep
                ));
            }
        }

        if supports_tags(&decl.resource_type) && !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|(k, v)| map([("Key", Value::str(k)), ("Value", Value::str(v))]))
                .collect();
            decl.properties.insert("Tags".to_string(), Value::List(tags));
        }

        tracing::debug!(
            logical_id = %decl.logical_id,
            resource_type = %decl.resource_type,
            component = %decl.component,
            "declared"
        );
        let id = decl.logical_id.clone();
        self.template.resources.insert(id.clone(), decl);
        Ok(id)
    }

    /// Add an exported output.
    pub fn output(&mut self, output: Output) -> Result<(), String> {
        if output.export_name.is_empty() {
            return Err(format!("output '{}' has an empty export name", output.logical_id));
        }
        if self.template.outputs.contains_key(&output.logical_id) {
            return Err(format!("output '{}' is already declared", output.logical_id));
        }
        if let Some(other) = self
            .template
            .outputs
            .values()
            .find(|o| o.export_name == output.export_name)
        {
            return Err(format!(
                "export name '{}' is used by both '{}' and '{}'",
                output.export_name, other.logical_id, output.logical_id
            ));
        }
        for dep in output.value.references() {
            if !self.contains(dep) {
                return Err(format!(
                    "output '{}' references undeclared '{}'",
                    output.logical_id, dep
                ));
            }
        }
        self.template
            .outputs
            .insert(output.logical_id.clone(), output);
        Ok(())
    }

    pub fn finish(self) -> Template {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Component;

    fn queue(id: &str) -> Declaration {
        Declaration::new(id, "AWS::SQS::Queue", Component::Queue)
    }

    fn output(id: &str, value: Value, export: &str) -> Output {
        Output {
            logical_id: id.to_string(),
            value,
            description: String::new(),
            export_name: export.to_string(),
        }
    }

    #[test]
    fn test_declare_in_order() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        b.declare(queue("First")).unwrap();
        b.declare(queue("Second").prop("Peer", Value::get_att("First", "Arn")))
            .unwrap();
        let t = b.finish();
        let ids: Vec<_> = t.resources.keys().collect();
        assert_eq!(ids, vec!["First", "Second"]);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        let err = b
            .declare(queue("Early").prop("Peer", Value::reference("Late")))
            .unwrap_err();
        assert!(err.contains("undeclared 'Late'"));
        assert!(b.is_empty());
    }

    #[test]
    fn test_depends_on_must_exist() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        let err = b.declare(queue("Q").depends_on("Ghost")).unwrap_err();
        assert!(err.contains("Ghost"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        b.declare(queue("Q")).unwrap();
        assert!(b.declare(queue("Q")).unwrap_err().contains("already declared"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        let err = b
            .declare(queue("Q").prop("Me", Value::reference("Q")))
            .unwrap_err();
        assert!(err.contains("itself"));
    }

    #[test]
    fn test_invalid_logical_id() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        assert!(b.declare(queue("my-queue")).is_err());
        assert!(b.declare(queue("")).is_err());
    }

    #[test]
    fn test_tags_only_on_taggable_types() {
        let tags = IndexMap::from([("Environment".to_string(), "dev".to_string())]);
        let mut b = StackBuilder::new("t", tags);
        b.declare(queue("Q")).unwrap();
        b.declare(Declaration::new(
            "Ingress",
            "AWS::EC2::SecurityGroupIngress",
            Component::Connectivity,
        ))
        .unwrap();
        let t = b.finish();
        let tags = t.resources["Q"].properties["Tags"].as_list().unwrap();
        assert_eq!(tags[0].get("Key").and_then(Value::as_str), Some("Environment"));
        assert_eq!(tags[0].get("Value").and_then(Value::as_str), Some("dev"));
        assert!(!t.resources["Ingress"].properties.contains_key("Tags"));
    }

    #[test]
    fn test_output_checks() {
        let mut b = StackBuilder::new("t", IndexMap::new());
        b.declare(queue("Q")).unwrap();
        b.output(output("Url", Value::reference("Q"), "QueueUrl")).unwrap();
        assert!(b
            .output(output("Url", Value::reference("Q"), "Other"))
            .unwrap_err()
            .contains("already declared"));
        assert!(b
            .output(output("Url2", Value::reference("Q"), "QueueUrl"))
            .unwrap_err()
            .contains("used by both"));
        assert!(b
            .output(output("Ghost", Value::reference("Nope"), "Ghost"))
            .unwrap_err()
            .contains("undeclared"));
        assert!(b
            .output(output("Empty", Value::reference("Q"), ""))
            .unwrap_err()
            .contains("empty export name"));
        assert_eq!(b.finish().outputs.len(), 1);
    }
}

//! Stack definition — declares every record in dependency order and emits
//! the exported outputs.
//!
//! The target group and listener are declared before the service so the
//! service can name the target group it registers with; everything else
//! follows declaration order of the sections in `stack.yaml`.

use super::builder::StackBuilder;
use super::template::{Output, Template, Value};
use super::types::StackConfig;
use crate::resources::compute::{self, TaskInputs};
use crate::resources::{
    connectivity, database, load_balancer, network, queue, secret, service, storage,
};
use indexmap::IndexMap;

/// Output logical ids, in emission order.
pub const OUTPUT_IDS: [&str; 4] = [
    "LoadBalancerDNS",
    "DatabaseEndpoint",
    "S3BucketName",
    "SQSQueueUrl",
];

/// Tags applied to every taggable record: environment and stack name, then
/// the user's tags (which may not override the first two).
pub fn stack_tags(config: &StackConfig) -> IndexMap<String, String> {
    let mut tags = IndexMap::new();
    tags.insert("Environment".to_string(), config.environment.clone());
    tags.insert("Stack".to_string(), config.stack_name());
    for (k, v) in &config.tags {
        tags.entry(k.clone()).or_insert_with(|| v.clone());
    }
    tags
}

pub fn description(config: &StackConfig) -> String {
    config.description.clone().unwrap_or_else(|| {
        format!(
            "Fleet management stack {} ({})",
            config.stack_name(),
            config.environment
        )
    })
}

/// Define the complete stack. Pure: identical configs yield identical
/// templates.
pub fn define_stack(config: &StackConfig) -> Result<Template, String> {
    let mut b = StackBuilder::new(&description(config), stack_tags(config));

    let net = network::declare(&mut b, &config.network)?;
    let bucket = storage::declare(&mut b, &config.storage)?;
    let credentials = secret::declare(&mut b, &config.secret)?;
    let db = database::declare(&mut b, &config.database, &net, &credentials)?;
    let q = queue::declare(&mut b, &config.queue)?;
    let cluster = compute::declare_cluster(&mut b, &config.cluster, &net)?;
    let task = compute::declare_task(
        &mut b,
        &config.task,
        &config.container,
        &TaskInputs {
            bucket: &bucket,
            queue: &q,
            secret: &credentials,
            database: &db,
            database_cfg: &config.database,
            target_cfg: &config.target,
        },
    )?;
    let lb = load_balancer::declare(&mut b, &config.load_balancer, &net)?;
    let target =
        load_balancer::declare_target(&mut b, &config.target, &lb, &net, task.container_port)?;
    let svc = service::declare(&mut b, &config.service, &net, &cluster, &task, &target)?;
    connectivity::declare(&mut b, &lb, &svc, &db, task.container_port)?;

    let prefix = &config.outputs.export_prefix;
    let outputs = [
        (lb.dns_name(), "Load balancer DNS name", "ALBDNS"),
        (db.endpoint_address(), "Database endpoint hostname", "DBEndpoint"),
        (bucket.name(), "Document bucket name", "S3Bucket"),
        (q.url(), "Message queue URL", "SQSQueue"),
    ];
    for (id, (value, desc, export)) in OUTPUT_IDS.iter().zip(outputs) {
        b.output(Output {
            logical_id: id.to_string(),
            value,
            description: desc.to_string(),
            export_name: format!("{}{}", prefix, export),
        })?;
    }

    tracing::info!(
        stack = %config.stack_name(),
        resources = b.len(),
        "stack defined"
    );
    Ok(b.finish())
}

/// Output values without export wrappers, for display.
pub fn output_values(template: &Template) -> Vec<(&str, &str, &Value)> {
    template
        .outputs
        .values()
        .map(|o| (o.logical_id.as_str(), o.export_name.as_str(), &o.value))
        .collect()
}

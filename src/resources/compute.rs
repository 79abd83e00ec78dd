//! Container cluster and task definition.
//!
//! The task role receives exactly three grants (bucket read/write, queue
//! send, secret read). The execution role may only write to the task's log
//! group and read the secret it injects into the container.

use super::database::DatabaseHandle;
use super::grants;
use super::network::NetworkHandle;
use super::queue::QueueHandle;
use super::secret::{SecretHandle, PASSWORD_KEY, USERNAME_KEY};
use super::storage::BucketHandle;
use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, Pseudo, RemovalPolicy, Value};
use crate::core::types::{
    ClusterConfig, Component, ContainerConfig, DatabaseConfig, TargetConfig, TaskConfig,
};

pub const CLUSTER_ID: &str = "FleetCluster";
pub const TASK_ID: &str = "ServiceTask";

/// Environment variable names wired from other declarations.
pub const DERIVED_ENV: &[&str] = &[
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "S3_BUCKET",
    "SQS_QUEUE_URL",
    "AWS_REGION",
];

/// Environment variable names sourced from the secret.
pub const SECRET_ENV: &[&str] = &["DB_USERNAME", "DB_PASSWORD"];

#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub id: String,
    /// The network the cluster's workloads are placed in
    pub vpc_id: String,
}

#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_definition_id: String,
    pub task_role_id: String,
    pub task_policy_id: String,
    pub execution_role_id: String,
    pub log_group_id: String,
    pub container_name: String,
    pub container_port: u16,
}

/// Everything the task definition wires into its container.
pub struct TaskInputs<'a> {
    pub bucket: &'a BucketHandle,
    pub queue: &'a QueueHandle,
    pub secret: &'a SecretHandle,
    pub database: &'a DatabaseHandle,
    pub database_cfg: &'a DatabaseConfig,
    pub target_cfg: &'a TargetConfig,
}

/// Declare the cluster inside the network.
pub fn declare_cluster(
    b: &mut StackBuilder,
    cfg: &ClusterConfig,
    net: &NetworkHandle,
) -> Result<ClusterHandle, String> {
    let insights = if cfg.container_insights {
        "enabled"
    } else {
        "disabled"
    };
    let id = b.declare(
        Declaration::new(CLUSTER_ID, "AWS::ECS::Cluster", Component::ComputeCluster).prop(
            "ClusterSettings",
            Value::List(vec![map([
                ("Name", "containerInsights".into()),
                ("Value", insights.into()),
            ])]),
        ),
    )?;
    Ok(ClusterHandle {
        id,
        vpc_id: net.vpc_id.clone(),
    })
}

/// Declare the task definition, its roles and grants, and its single
/// container.
pub fn declare_task(
    b: &mut StackBuilder,
    task: &TaskConfig,
    container: &ContainerConfig,
    inputs: &TaskInputs<'_>,
) -> Result<TaskHandle, String> {
    let task_role_id = b.declare(grants::task_role(
        &format!("{}TaskRole", TASK_ID),
        Component::TaskDefinition,
    ))?;
    let task_policy_id = grants::attach_policy(
        b,
        &task_role_id,
        Component::TaskDefinition,
        &[
            grants::bucket_read_write(inputs.bucket),
            grants::queue_send(inputs.queue),
            grants::secret_read(inputs.secret),
        ],
    )?;

    let mut log_group = Declaration::new(
        &format!("{}LogGroup", TASK_ID),
        "AWS::Logs::LogGroup",
        Component::TaskDefinition,
    )
    .removal(RemovalPolicy::Retain);
    if let Some(days) = container.log_retention_days {
        log_group = log_group.prop("RetentionInDays", days);
    }
    let log_group_id = b.declare(log_group)?;

    let execution_role_id = b.declare(grants::task_role(
        &format!("{}ExecutionRole", TASK_ID),
        Component::TaskDefinition,
    ))?;
    let execution_policy_id = grants::attach_policy(
        b,
        &execution_role_id,
        Component::TaskDefinition,
        &[
            grants::log_write(&log_group_id),
            grants::secret_read(inputs.secret),
        ],
    )?;

    let definition = container_definition(container, inputs, &log_group_id);
    let task_definition_id = b.declare(
        Declaration::new(TASK_ID, "AWS::ECS::TaskDefinition", Component::TaskDefinition)
            .with_props(props([
                ("ContainerDefinitions", Value::List(vec![definition])),
                ("Cpu", Value::str(task.cpu.to_string())),
                ("ExecutionRoleArn", Value::get_att(&execution_role_id, "Arn")),
                ("Family", Value::Pseudo(Pseudo::StackName)),
                ("Memory", Value::str(task.memory_mib.to_string())),
                ("NetworkMode", "awsvpc".into()),
                ("RequiresCompatibilities", Value::List(vec!["FARGATE".into()])),
                ("TaskRoleArn", Value::get_att(&task_role_id, "Arn")),
            ]))
            .depends_on(&execution_policy_id),
    )?;

    tracing::info!(
        cpu = task.cpu,
        memory_mib = task.memory_mib,
        image = %container.image,
        "task definition declared"
    );

    Ok(TaskHandle {
        task_definition_id,
        task_role_id,
        task_policy_id,
        execution_role_id,
        log_group_id,
        container_name: container.name.clone(),
        container_port: container.port,
    })
}

/// Health check command: explicit, or a curl probe of the target's health
/// path on the container port.
pub fn health_check_command(container: &ContainerConfig, target: &TargetConfig) -> Vec<String> {
    if !container.health_check.command.is_empty() {
        return container.health_check.command.clone();
    }
    vec![
        "CMD-SHELL".to_string(),
        format!(
            "curl -f http://localhost:{}{} || exit 1",
            container.port, target.health_check_path
        ),
    ]
}

fn env_pair(name: &str, value: Value) -> Value {
    map([("Name", Value::str(name)), ("Value", value)])
}

fn container_definition(
    container: &ContainerConfig,
    inputs: &TaskInputs<'_>,
    log_group_id: &str,
) -> Value {
    let mut environment = vec![
        env_pair("DB_HOST", inputs.database.endpoint_address()),
        env_pair("DB_PORT", inputs.database.endpoint_port()),
        env_pair("DB_NAME", Value::str(&inputs.database_cfg.database_name)),
        env_pair("S3_BUCKET", inputs.bucket.name()),
        env_pair("SQS_QUEUE_URL", inputs.queue.url()),
        env_pair("AWS_REGION", Value::Pseudo(Pseudo::Region)),
    ];
    environment.extend(
        container
            .environment
            .iter()
            .map(|(k, v)| env_pair(k, Value::str(v))),
    );

    let secrets = vec![
        map([
            ("Name", "DB_USERNAME".into()),
            ("ValueFrom", inputs.secret.field_source(USERNAME_KEY)),
        ]),
        map([
            ("Name", "DB_PASSWORD".into()),
            ("ValueFrom", inputs.secret.field_source(PASSWORD_KEY)),
        ]),
    ];

    let hc = &container.health_check;
    let command = health_check_command(container, inputs.target_cfg)
        .into_iter()
        .map(Value::Str)
        .collect();

    map([
        ("Name", Value::str(&container.name)),
        ("Image", Value::str(&container.image)),
        ("Essential", true.into()),
        ("Environment", Value::List(environment)),
        ("Secrets", Value::List(secrets)),
        (
            "LogConfiguration",
            map([
                ("LogDriver", "awslogs".into()),
                (
                    "Options",
                    map([
                        ("awslogs-group", Value::reference(log_group_id)),
                        ("awslogs-stream-prefix", Value::str(&container.log_stream_prefix)),
                        ("awslogs-region", Value::Pseudo(Pseudo::Region)),
                    ]),
                ),
            ]),
        ),
        (
            "HealthCheck",
            map([
                ("Command", Value::List(command)),
                ("Interval", hc.interval_seconds.into()),
                ("Retries", hc.retries.into()),
                ("StartPeriod", hc.start_period_seconds.into()),
                ("Timeout", hc.timeout_seconds.into()),
            ]),
        ),
        (
            "PortMappings",
            Value::List(vec![map([
                ("ContainerPort", container.port.into()),
                ("Protocol", "tcp".into()),
            ])]),
        ),
    ])
}

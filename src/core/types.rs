//! Configuration, lock, plan and provenance types.
//!
//! `StackConfig` is the YAML schema for `stack.yaml`. Every section carries
//! defaults, so a file naming only the version, stack name and environment
//! describes the reference stack. All types derive Serialize/Deserialize for
//! YAML roundtripping.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Top-level stack.yaml
// ============================================================================

/// Root configuration: the desired shape of one stack instantiation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack base name; the synthesized stack is `{name}-{environment}`
    pub name: String,

    /// Deployment environment identifier (dev, staging, prod, ...)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Target region, recorded in the lock. The template itself is region-agnostic.
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional template description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters (templatable)
    #[serde(default)]
    #[schemars(with = "HashMap<String, serde_json::Value>")]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Extra tags applied to every taggable resource
    #[serde(default)]
    pub tags: IndexMap<String, String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub secret: SecretConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub task: TaskConfig,

    #[serde(default)]
    pub container: ContainerConfig,

    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl StackConfig {
    /// The reference stack: every section at its defaults.
    pub fn minimal(name: &str, environment: &str) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.to_string(),
            environment: environment.to_string(),
            region: default_region(),
            description: None,
            params: HashMap::new(),
            tags: IndexMap::new(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            secret: SecretConfig::default(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            cluster: ClusterConfig::default(),
            task: TaskConfig::default(),
            container: ContainerConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            service: ServiceConfig::default(),
            target: TargetConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }

    /// Name of the synthesized stack.
    pub fn stack_name(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

// ============================================================================
// Sections
// ============================================================================

/// Isolated virtual network.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NetworkConfig {
    /// VPC address range
    #[serde(default = "default_cidr")]
    pub cidr: String,

    /// Availability zones to spread subnets across
    #[serde(default = "default_max_azs")]
    pub max_azs: u32,

    /// NAT gateways providing private egress
    #[serde(default = "default_nat_gateways")]
    pub nat_gateways: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            nat_gateways: default_nat_gateways(),
        }
    }
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_max_azs() -> u32 {
    2
}

fn default_nat_gateways() -> u32 {
    1
}

/// Private document bucket. Encryption, versioning, the public access
/// block and retention on deletion are not configurable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,

    /// Objects expire this many days after creation
    #[serde(default = "default_expiration_days")]
    pub expiration_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_name: default_bucket_name(),
            expiration_days: default_expiration_days(),
        }
    }
}

fn default_bucket_name() -> String {
    "fleet-documents".to_string()
}

fn default_expiration_days() -> u32 {
    90
}

/// Generated database credential pair.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SecretConfig {
    #[serde(default = "default_secret_name")]
    pub name: String,

    /// Fixed `username` template field
    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            name: default_secret_name(),
            username: default_username(),
        }
    }
}

fn default_secret_name() -> String {
    "fleet-db-credentials".to_string()
}

fn default_username() -> String {
    "postgres".to_string()
}

/// Serverless relational database cluster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseConfig {
    #[serde(default = "default_engine_version")]
    pub engine_version: String,

    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Minimum serverless capacity units
    #[serde(default = "default_min_capacity")]
    pub min_capacity: f64,

    /// Maximum serverless capacity units
    #[serde(default = "default_max_capacity")]
    pub max_capacity: f64,

    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u32,

    /// Listener port; the engine default unless overridden
    #[serde(default = "default_db_port")]
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine_version: default_engine_version(),
            database_name: default_database_name(),
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
            backup_retention_days: default_backup_retention_days(),
            port: default_db_port(),
        }
    }
}

fn default_engine_version() -> String {
    "15.4".to_string()
}

fn default_database_name() -> String {
    "fleet_management".to_string()
}

fn default_min_capacity() -> f64 {
    0.5
}

fn default_max_capacity() -> f64 {
    2.0
}

fn default_backup_retention_days() -> u32 {
    7
}

fn default_db_port() -> u16 {
    5432
}

/// Encrypted message queue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueConfig {
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u32,

    #[serde(default = "default_queue_retention_days")]
    pub retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_seconds: default_visibility_timeout(),
            retention_days: default_queue_retention_days(),
        }
    }
}

fn default_visibility_timeout() -> u32 {
    300
}

fn default_queue_retention_days() -> u32 {
    14
}

/// Container cluster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClusterConfig {
    #[serde(default = "default_true")]
    pub container_insights: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            container_insights: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Task sizing in Fargate units (1024 cpu = 1 vCPU).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskConfig {
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_mib: default_memory_mib(),
        }
    }
}

fn default_cpu() -> u32 {
    512
}

fn default_memory_mib() -> u32 {
    2048
}

/// The single application container.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContainerConfig {
    #[serde(default = "default_container_name")]
    pub name: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// TCP port the container listens on
    #[serde(default = "default_container_port")]
    pub port: u16,

    #[serde(default = "default_stream_prefix")]
    pub log_stream_prefix: String,

    /// Log group retention; `None` keeps logs indefinitely
    #[serde(default)]
    pub log_retention_days: Option<u32>,

    /// Additional plain environment variables
    #[serde(default)]
    pub environment: IndexMap<String, String>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: default_container_name(),
            image: default_image(),
            port: default_container_port(),
            log_stream_prefix: default_stream_prefix(),
            log_retention_days: None,
            environment: IndexMap::new(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

fn default_container_name() -> String {
    "AppContainer".to_string()
}

fn default_image() -> String {
    "public.ecr.aws/docker/library/nginx:latest".to_string()
}

fn default_container_port() -> u16 {
    8080
}

fn default_stream_prefix() -> String {
    "fleet-service".to_string()
}

/// Container-level health check.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthCheckConfig {
    /// Explicit command; when empty, a curl probe against the target's
    /// health path on the container port is generated
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "default_hc_interval")]
    pub interval_seconds: u32,

    #[serde(default = "default_hc_timeout")]
    pub timeout_seconds: u32,

    #[serde(default = "default_hc_retries")]
    pub retries: u32,

    #[serde(default = "default_hc_start_period")]
    pub start_period_seconds: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            interval_seconds: default_hc_interval(),
            timeout_seconds: default_hc_timeout(),
            retries: default_hc_retries(),
            start_period_seconds: default_hc_start_period(),
        }
    }
}

fn default_hc_interval() -> u32 {
    30
}

fn default_hc_timeout() -> u32 {
    5
}

fn default_hc_retries() -> u32 {
    3
}

fn default_hc_start_period() -> u32 {
    60
}

/// Public entry point.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoadBalancerConfig {
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,

    #[serde(default = "default_true")]
    pub internet_facing: bool,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            listener_port: default_listener_port(),
            internet_facing: true,
        }
    }
}

fn default_listener_port() -> u16 {
    80
}

/// Replicated service running the task definition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServiceConfig {
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    #[serde(default = "default_grace")]
    pub health_check_grace_seconds: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            desired_count: default_desired_count(),
            health_check_grace_seconds: default_grace(),
        }
    }
}

fn default_desired_count() -> u32 {
    2
}

fn default_grace() -> u32 {
    60
}

/// Target group registration of the service behind the listener.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TargetConfig {
    #[serde(default = "default_health_path")]
    pub health_check_path: String,

    #[serde(default = "default_hc_interval")]
    pub interval_seconds: u32,

    #[serde(default = "default_hc_timeout")]
    pub timeout_seconds: u32,

    #[serde(default = "default_healthy")]
    pub healthy_threshold: u32,

    #[serde(default = "default_unhealthy")]
    pub unhealthy_threshold: u32,

    #[serde(default = "default_deregistration")]
    pub deregistration_delay_seconds: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            health_check_path: default_health_path(),
            interval_seconds: default_hc_interval(),
            timeout_seconds: default_hc_timeout(),
            healthy_threshold: default_healthy(),
            unhealthy_threshold: default_unhealthy(),
            deregistration_delay_seconds: default_deregistration(),
        }
    }
}

fn default_health_path() -> String {
    "/actuator/health".to_string()
}

fn default_healthy() -> u32 {
    2
}

fn default_unhealthy() -> u32 {
    3
}

fn default_deregistration() -> u32 {
    30
}

/// Cross-stack exports.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutputsConfig {
    /// Prepended to every export name (`{prefix}ALBDNS`, ...)
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            export_prefix: default_export_prefix(),
        }
    }
}

fn default_export_prefix() -> String {
    "Fleet".to_string()
}

// ============================================================================
// Components
// ============================================================================

/// Stack component a declared record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Network,
    ObjectStore,
    Secret,
    Database,
    Queue,
    ComputeCluster,
    TaskDefinition,
    LoadBalancer,
    Service,
    Connectivity,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::ObjectStore => write!(f, "object_store"),
            Self::Secret => write!(f, "secret"),
            Self::Database => write!(f, "database"),
            Self::Queue => write!(f, "queue"),
            Self::ComputeCluster => write!(f, "compute_cluster"),
            Self::TaskDefinition => write!(f, "task_definition"),
            Self::LoadBalancer => write!(f, "load_balancer"),
            Self::Service => write!(f, "service"),
            Self::Connectivity => write!(f, "connectivity"),
        }
    }
}

// ============================================================================
// State / Lock file
// ============================================================================

/// Per-stack lock file, written after every synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackLock {
    /// Schema version
    pub schema: String,

    /// Synthesized stack name
    pub stack: String,

    pub environment: String,

    pub region: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 hash of the rendered template file
    pub template_hash: String,

    /// Per-resource state, in creation order
    pub resources: IndexMap<String, ResourceLock>,

    /// Output logical id → export name
    #[serde(default)]
    pub exports: IndexMap<String, String>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Cloud resource type, e.g. `AWS::S3::Bucket`
    #[serde(rename = "type")]
    pub resource_type: String,

    pub component: Component,

    /// BLAKE3 hash of the canonical resource JSON
    pub hash: String,

    /// Logical ids this resource references
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// ============================================================================
// Plan
// ============================================================================

/// Action the next deployment would take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Logical id
    pub logical_id: String,

    pub resource_type: String,

    pub component: Component,

    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Full change plan against the previous synthesis.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Stack name
    pub name: String,

    /// Creations and updates in creation order, then destroys in reverse
    /// dependency order
    pub changes: Vec<PlannedChange>,

    /// Canonical creation order of the new template
    pub creation_order: Vec<String>,

    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Synthesis event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SynthEvent {
    SynthStarted {
        stack: String,
        run_id: String,
        fleetstack_version: String,
    },
    SynthCompleted {
        stack: String,
        run_id: String,
        resources: u32,
        outputs: u32,
        template_hash: String,
        total_seconds: f64,
    },
    AuditFailed {
        stack: String,
        check: String,
        resource: String,
        detail: String,
    },
    DriftDetected {
        stack: String,
        resource: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: SynthEvent,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

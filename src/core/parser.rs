//! YAML parsing and validation.
//!
//! Parses stack.yaml and validates every section against the limits the
//! platform enforces at deploy time, so a bad value fails synthesis instead
//! of a deployment:
//! - Version must be "1.0"
//! - Names follow the platform's naming rules
//! - Numeric settings stay inside their allowed ranges
//! - Custom container environment never shadows derived variables

use super::types::*;
use crate::resources::compute::{DERIVED_ENV, SECRET_ENV};
use crate::resources::database::{MAX_CAPACITY_CEILING, MIN_CAPACITY_FLOOR};
use crate::resources::network;
use regex::Regex;
use std::path::Path;

const STACK_NAME: &str = r"^[a-z][a-z0-9-]{0,31}$";
const ENVIRONMENT: &str = r"^[a-z][a-z0-9-]{0,15}$";
const BUCKET_NAME: &str = r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$";
const IPV4_LIKE: &str = r"^\d+\.\d+\.\d+\.\d+$";
const DATABASE_NAME: &str = r"^[A-Za-z][A-Za-z0-9_]{0,62}$";
const ENV_VAR_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const EXPORT_PREFIX: &str = r"^[A-Za-z][A-Za-z0-9]{0,31}$";

/// Retention periods the log service accepts, in days.
const LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a stack.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<StackConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a stack.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<StackConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

fn matches(pattern: &str, value: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(value))
}

/// Memory sizes (MiB) a serverless task may pair with `cpu` units.
pub fn fargate_memory_options(cpu: u32) -> Option<Vec<u32>> {
    let gib = |from: u32, to: u32| (from..=to).map(|g| g * 1024).collect::<Vec<_>>();
    match cpu {
        256 => Some(vec![512, 1024, 2048]),
        512 => Some(gib(1, 4)),
        1024 => Some(gib(2, 8)),
        2048 => Some(gib(4, 16)),
        4096 => Some(gib(8, 30)),
        _ => None,
    }
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut err = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        err(format!("version must be \"1.0\", got \"{}\"", config.version));
    }
    if !matches(STACK_NAME, &config.name) {
        err(format!(
            "name '{}' must be lowercase alphanumeric or '-', starting with a letter (max 32)",
            config.name
        ));
    }
    if !matches(ENVIRONMENT, &config.environment) {
        err(format!(
            "environment '{}' must be lowercase alphanumeric or '-', starting with a letter (max 16)",
            config.environment
        ));
    }
    for key in config.tags.keys() {
        if key.is_empty() || key.starts_with("aws:") {
            err(format!("tag key '{}' is reserved or empty", key));
        }
    }

    validate_network(&config.network, &mut err);
    validate_storage(&config.storage, &mut err);
    validate_secret(&config.secret, &mut err);
    validate_database(&config.database, &mut err);
    validate_queue(&config.queue, &mut err);
    validate_task(&config.task, &mut err);
    validate_container(&config.container, &mut err);
    validate_target(&config.target, &mut err);

    if config.load_balancer.listener_port == 0 {
        err("load_balancer.listener_port must be non-zero".to_string());
    }
    if config.service.desired_count == 0 {
        err("service.desired_count must be at least 1".to_string());
    }
    if !matches(EXPORT_PREFIX, &config.outputs.export_prefix) {
        err(format!(
            "outputs.export_prefix '{}' must be alphanumeric, starting with a letter (max 32)",
            config.outputs.export_prefix
        ));
    }

    errors
}

fn validate_network(cfg: &NetworkConfig, err: &mut impl FnMut(String)) {
    let zones_ok = network::AZ_RANGE.contains(&cfg.max_azs);
    if !zones_ok {
        err(format!(
            "network.max_azs must be between {} and {}, got {}",
            network::AZ_RANGE.start(),
            network::AZ_RANGE.end(),
            cfg.max_azs
        ));
    }
    if cfg.nat_gateways < 1 || cfg.nat_gateways > cfg.max_azs {
        err(format!(
            "network.nat_gateways must be between 1 and max_azs ({}), got {}",
            cfg.max_azs, cfg.nat_gateways
        ));
    }
    if let Err(e) = network::check_vpc_cidr(&cfg.cidr) {
        err(format!("network.cidr: {}", e));
        return;
    }
    // splitting is only meaningful once the zone count is bounded
    if zones_ok {
        if let Err(e) = network::subnet_layout(cfg) {
            err(format!("network.cidr: {}", e));
        }
    }
}

fn validate_storage(cfg: &StorageConfig, err: &mut impl FnMut(String)) {
    let name = &cfg.bucket_name;
    if !matches(BUCKET_NAME, name) || name.contains("..") || matches(IPV4_LIKE, name) {
        err(format!(
            "storage.bucket_name '{}' is not a valid bucket name (3-63 lowercase letters, digits, '.' or '-')",
            name
        ));
    }
    if cfg.expiration_days == 0 {
        err("storage.expiration_days must be at least 1".to_string());
    }
}

fn validate_secret(cfg: &SecretConfig, err: &mut impl FnMut(String)) {
    if cfg.name.trim().is_empty() {
        err("secret.name must not be empty".to_string());
    }
    if cfg.username.trim().is_empty() {
        err("secret.username must not be empty".to_string());
    }
}

fn validate_database(cfg: &DatabaseConfig, err: &mut impl FnMut(String)) {
    let (min, max) = (cfg.min_capacity, cfg.max_capacity);
    if !(MIN_CAPACITY_FLOOR <= min && min <= max && max <= MAX_CAPACITY_CEILING) {
        err(format!(
            "database capacity must satisfy {} <= min <= max <= {}, got min {} max {}",
            MIN_CAPACITY_FLOOR, MAX_CAPACITY_CEILING, min, max
        ));
    }
    for (field, value) in [("min_capacity", min), ("max_capacity", max)] {
        if (value * 2.0).fract() != 0.0 {
            err(format!("database.{} must be a multiple of 0.5, got {}", field, value));
        }
    }
    if !(1..=35).contains(&cfg.backup_retention_days) {
        err(format!(
            "database.backup_retention_days must be 1..=35, got {}",
            cfg.backup_retention_days
        ));
    }
    if !matches(DATABASE_NAME, &cfg.database_name) {
        err(format!(
            "database.database_name '{}' must start with a letter and contain only letters, digits or '_'",
            cfg.database_name
        ));
    }
    if cfg.engine_version.trim().is_empty() {
        err("database.engine_version must not be empty".to_string());
    }
    if cfg.port < 1150 {
        err(format!("database.port must be 1150..=65535, got {}", cfg.port));
    }
}

fn validate_queue(cfg: &QueueConfig, err: &mut impl FnMut(String)) {
    if cfg.visibility_timeout_seconds > 43_200 {
        err(format!(
            "queue.visibility_timeout_seconds must be 0..=43200, got {}",
            cfg.visibility_timeout_seconds
        ));
    }
    if !(1..=14).contains(&cfg.retention_days) {
        err(format!(
            "queue.retention_days must be 1..=14, got {}",
            cfg.retention_days
        ));
    }
}

fn validate_task(cfg: &TaskConfig, err: &mut impl FnMut(String)) {
    match fargate_memory_options(cfg.cpu) {
        None => err(format!(
            "task.cpu must be one of 256, 512, 1024, 2048, 4096, got {}",
            cfg.cpu
        )),
        Some(options) if !options.contains(&cfg.memory_mib) => err(format!(
            "task.memory_mib {} is not valid with cpu {} (allowed: {}..={})",
            cfg.memory_mib,
            cfg.cpu,
            options.first().copied().unwrap_or_default(),
            options.last().copied().unwrap_or_default()
        )),
        Some(_) => {}
    }
}

fn validate_container(cfg: &ContainerConfig, err: &mut impl FnMut(String)) {
    if cfg.name.trim().is_empty() {
        err("container.name must not be empty".to_string());
    }
    if cfg.image.trim().is_empty() {
        err("container.image must not be empty".to_string());
    }
    if cfg.port == 0 {
        err("container.port must be non-zero".to_string());
    }
    if cfg.log_stream_prefix.trim().is_empty() {
        err("container.log_stream_prefix must not be empty".to_string());
    }
    if let Some(days) = cfg.log_retention_days {
        if !LOG_RETENTION_DAYS.contains(&days) {
            err(format!(
                "container.log_retention_days {} is not a supported retention period",
                days
            ));
        }
    }
    for name in cfg.environment.keys() {
        if DERIVED_ENV.contains(&name.as_str()) || SECRET_ENV.contains(&name.as_str()) {
            err(format!(
                "container.environment '{}' shadows a variable wired by the stack",
                name
            ));
        } else if !matches(ENV_VAR_NAME, name) {
            err(format!("container.environment '{}' is not a valid variable name", name));
        }
    }

    let hc = &cfg.health_check;
    if !(5..=300).contains(&hc.interval_seconds) {
        err(format!(
            "container.health_check.interval_seconds must be 5..=300, got {}",
            hc.interval_seconds
        ));
    }
    if !(2..=60).contains(&hc.timeout_seconds) {
        err(format!(
            "container.health_check.timeout_seconds must be 2..=60, got {}",
            hc.timeout_seconds
        ));
    }
    if !(1..=10).contains(&hc.retries) {
        err(format!(
            "container.health_check.retries must be 1..=10, got {}",
            hc.retries
        ));
    }
    if hc.start_period_seconds > 300 {
        err(format!(
            "container.health_check.start_period_seconds must be 0..=300, got {}",
            hc.start_period_seconds
        ));
    }
    if let Some(first) = hc.command.first() {
        if first != "CMD" && first != "CMD-SHELL" {
            err(format!(
                "container.health_check.command must start with CMD or CMD-SHELL, got '{}'",
                first
            ));
        }
    }
}

fn validate_target(cfg: &TargetConfig, err: &mut impl FnMut(String)) {
    if !cfg.health_check_path.starts_with('/') {
        err(format!(
            "target.health_check_path '{}' must start with '/'",
            cfg.health_check_path
        ));
    }
    for (field, value) in [
        ("healthy_threshold", cfg.healthy_threshold),
        ("unhealthy_threshold", cfg.unhealthy_threshold),
    ] {
        if !(2..=10).contains(&value) {
            err(format!("target.{} must be 2..=10, got {}", field, value));
        }
    }
    if !(5..=300).contains(&cfg.interval_seconds) {
        err(format!(
            "target.interval_seconds must be 5..=300, got {}",
            cfg.interval_seconds
        ));
    }
    if cfg.timeout_seconds < 2 || cfg.timeout_seconds >= cfg.interval_seconds {
        err(format!(
            "target.timeout_seconds must be at least 2 and less than interval_seconds ({}), got {}",
            cfg.interval_seconds, cfg.timeout_seconds
        ));
    }
    if cfg.deregistration_delay_seconds > 3600 {
        err(format!(
            "target.deregistration_delay_seconds must be 0..=3600, got {}",
            cfg.deregistration_delay_seconds
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &StackConfig) -> Vec<String> {
        validate_config(config)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    fn has_error(config: &StackConfig, fragment: &str) -> bool {
        messages(config).iter().any(|m| m.contains(fragment))
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let yaml = r#"
version: "1.0"
name: fleet
environment: staging
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.stack_name(), "fleet-staging");
        assert_eq!(config.task.memory_mib, 2048);
        assert_eq!(config.target.health_check_path, "/actuator/health");
        let errors = messages(&config);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_parse_full_sections() {
        let yaml = r#"
version: "1.0"
name: fleet
environment: prod
region: eu-west-1
tags:
  Team: fleet-ops
database:
  min_capacity: 1.0
  max_capacity: 2.0
task:
  cpu: 1024
  memory_mib: 4096
container:
  image: registry.example.com/fleet/service:1.4.2
  environment:
    SPRING_PROFILES_ACTIVE: prod
service:
  desired_count: 3
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.tags["Team"], "fleet-ops");
        assert_eq!(config.service.desired_count, 3);
        assert_eq!(config.container.environment["SPRING_PROFILES_ACTIVE"], "prod");
        assert!(messages(&config).is_empty());
    }

    #[test]
    fn test_bad_version() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.version = "2.0".to_string();
        assert!(has_error(&config, "version"));
    }

    #[test]
    fn test_bad_names() {
        let config = StackConfig::minimal("Fleet_Stack", "Dev Env");
        let errors = messages(&config);
        assert!(errors.iter().any(|m| m.starts_with("name")));
        assert!(errors.iter().any(|m| m.starts_with("environment")));
    }

    #[test]
    fn test_network_limits() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.network.max_azs = 1;
        config.network.nat_gateways = 0;
        assert!(has_error(&config, "max_azs must be between 2 and 6"));
        assert!(has_error(&config, "nat_gateways"));

        let mut config = StackConfig::minimal("fleet", "dev");
        config.network.cidr = "10.0.0.0/27".to_string();
        assert!(has_error(&config, "too small"));

        config.network.cidr = "10.0.0.5/16".to_string();
        assert!(has_error(&config, "not aligned"));
    }

    #[test]
    fn test_zone_count_upper_bound() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.network.max_azs = 50;
        assert!(has_error(&config, "max_azs must be between 2 and 6"));
        assert_eq!(messages(&config).len(), 1);

        config.network.max_azs = 6;
        assert!(messages(&config).is_empty());
    }

    #[test]
    fn test_vpc_prefix_range() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.network.cidr = "10.0.0.0/8".to_string();
        assert!(has_error(&config, "a VPC block must be /16 to /28"));

        config.network.cidr = "0.0.0.0/0".to_string();
        config.network.max_azs = 100_000_000;
        config.network.nat_gateways = 1;
        let errors = messages(&config);
        assert!(errors.iter().any(|m| m.contains("prefix /0")));
        assert!(errors.iter().any(|m| m.contains("max_azs")));
    }

    #[test]
    fn test_bucket_name_rules() {
        let mut config = StackConfig::minimal("fleet", "dev");
        for bad in ["Fleet-Docs", "ab", "fleet..docs", "192.168.1.1", "-fleet"] {
            config.storage.bucket_name = bad.to_string();
            assert!(has_error(&config, "bucket_name"), "accepted {}", bad);
        }
        config.storage.bucket_name = "fleet-docs.prod".to_string();
        assert!(messages(&config).is_empty());
    }

    #[test]
    fn test_capacity_range() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.database.min_capacity = 2.0;
        config.database.max_capacity = 1.0;
        assert!(has_error(&config, "min <= max"));

        config.database.min_capacity = 0.5;
        config.database.max_capacity = 4.0;
        assert!(has_error(&config, "min <= max"));

        config.database.max_capacity = 1.25;
        assert!(has_error(&config, "multiple of 0.5"));
    }

    #[test]
    fn test_database_settings() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.database.backup_retention_days = 0;
        config.database.database_name = "fleet-management".to_string();
        assert!(has_error(&config, "backup_retention_days"));
        assert!(has_error(&config, "database_name"));
    }

    #[test]
    fn test_queue_limits() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.queue.visibility_timeout_seconds = 50_000;
        config.queue.retention_days = 15;
        assert!(has_error(&config, "visibility_timeout_seconds"));
        assert!(has_error(&config, "retention_days"));
    }

    #[test]
    fn test_fargate_pairs() {
        assert_eq!(fargate_memory_options(256), Some(vec![512, 1024, 2048]));
        assert_eq!(
            fargate_memory_options(512),
            Some(vec![1024, 2048, 3072, 4096])
        );
        assert_eq!(fargate_memory_options(4096).map(|o| o.len()), Some(23));
        assert_eq!(fargate_memory_options(300), None);

        let mut config = StackConfig::minimal("fleet", "dev");
        config.task.memory_mib = 8192;
        assert!(has_error(&config, "not valid with cpu 512"));
        config.task.cpu = 3000;
        assert!(has_error(&config, "task.cpu"));
    }

    #[test]
    fn test_environment_cannot_shadow_wired_variables() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config
            .container
            .environment
            .insert("DB_HOST".to_string(), "localhost".to_string());
        config
            .container
            .environment
            .insert("DB_PASSWORD".to_string(), "hunter2".to_string());
        config
            .container
            .environment
            .insert("1BAD".to_string(), "x".to_string());
        let errors = messages(&config);
        assert_eq!(errors.iter().filter(|m| m.contains("shadows")).count(), 2);
        assert!(errors.iter().any(|m| m.contains("not a valid variable name")));
    }

    #[test]
    fn test_container_health_check_bounds() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.container.health_check.interval_seconds = 1;
        config.container.health_check.retries = 0;
        config.container.health_check.command = vec!["curl".to_string()];
        config.container.log_retention_days = Some(10);
        assert!(has_error(&config, "health_check.interval_seconds"));
        assert!(has_error(&config, "health_check.retries"));
        assert!(has_error(&config, "CMD or CMD-SHELL"));
        assert!(has_error(&config, "log_retention_days"));
    }

    #[test]
    fn test_target_rules() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.target.health_check_path = "actuator/health".to_string();
        config.target.healthy_threshold = 1;
        config.target.timeout_seconds = 30;
        config.target.deregistration_delay_seconds = 4000;
        assert!(has_error(&config, "must start with '/'"));
        assert!(has_error(&config, "healthy_threshold"));
        assert!(has_error(&config, "less than interval_seconds"));
        assert!(has_error(&config, "deregistration_delay_seconds"));
    }

    #[test]
    fn test_service_and_outputs() {
        let mut config = StackConfig::minimal("fleet", "dev");
        config.service.desired_count = 0;
        config.outputs.export_prefix = "fleet-prod".to_string();
        config.tags.insert("aws:owner".to_string(), "x".to_string());
        assert!(has_error(&config, "desired_count"));
        assert!(has_error(&config, "export_prefix"));
        assert!(has_error(&config, "reserved"));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(
            &path,
            r#"
version: "1.0"
name: file-test
"#,
        )
        .unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.name, "file-test");
        assert_eq!(config.environment, "dev");
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_config_file(Path::new("/nonexistent/stack.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_config("not: [valid: yaml: {{");
        assert!(result.is_err());
    }
}

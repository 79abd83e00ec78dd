//! Synthesis pipeline.
//!
//! parse → resolve → validate → define → audit → render → write template,
//! lock and events. A dry run stops after rendering.

use super::audit::{self, Finding};
use super::codegen::{self, TemplateFormat};
use super::parser;
use super::resolver;
use super::stack;
use super::state;
use super::template::Template;
use super::types::*;
use crate::tripwire::eventlog::{self, EventLog};
use crate::tripwire::hasher;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Configuration for a synth run.
pub struct SynthConfig<'a> {
    pub config: &'a StackConfig,
    pub state_dir: &'a Path,
    pub out_dir: &'a Path,
    pub format: TemplateFormat,
    pub dry_run: bool,
    /// Write the template even if the audit reports findings
    pub allow_findings: bool,
}

/// Outcome of a synth run.
#[derive(Debug)]
pub struct SynthResult {
    pub stack: String,
    pub template: Template,
    pub rendered: String,
    pub findings: Vec<Finding>,
    /// None on a dry run
    pub template_path: Option<PathBuf>,
    pub lock_path: Option<PathBuf>,
    pub template_hash: String,
}

/// Load a stack file, applying an environment override before templates
/// are resolved.
pub fn load_config(path: &Path, env_override: Option<&str>) -> Result<StackConfig, String> {
    let mut config = parser::parse_config_file(path)?;
    if let Some(env) = env_override {
        tracing::debug!(from = %config.environment, to = env, "environment overridden");
        config.environment = env.to_string();
    }
    Ok(config)
}

/// Resolve, validate and define a stack. Validation errors are joined into
/// one message.
pub fn prepare(config: &StackConfig) -> Result<(StackConfig, Template), String> {
    let resolved = resolver::resolve_config_templates(config)?;
    let errors = parser::validate_config(&resolved);
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        return Err(format!(
            "{} validation error(s):\n{}",
            errors.len(),
            lines.join("\n")
        ));
    }
    let template = stack::define_stack(&resolved)?;
    Ok((resolved, template))
}

/// Synthesize a template in memory. Audit findings are returned, not raised.
pub fn synthesize(config: &StackConfig) -> Result<(StackConfig, Template, Vec<Finding>), String> {
    let (resolved, template) = prepare(config)?;
    let findings = audit::audit(&template);
    Ok((resolved, template, findings))
}

/// Append an `audit_failed` event per finding.
fn record_findings(log: &EventLog, findings: &[Finding]) -> Result<(), String> {
    for f in findings {
        log.append(SynthEvent::AuditFailed {
            stack: log.stack().to_string(),
            check: f.check.to_string(),
            resource: f.logical_id.clone(),
            detail: f.detail.clone(),
        })?;
    }
    Ok(())
}

/// Findings stop the pipeline unless explicitly allowed.
fn gate_findings(findings: &[Finding], allow: bool) -> Result<(), String> {
    match findings.first() {
        Some(first) if !allow => Err(format!(
            "audit failed with {} finding(s); first: {}",
            findings.len(),
            first
        )),
        _ => Ok(()),
    }
}

/// Run the full pipeline.
pub fn run(cfg: &SynthConfig) -> Result<SynthResult, String> {
    let start = Instant::now();
    let name = cfg.config.stack_name();
    let run_id = eventlog::generate_run_id(&name);
    tracing::info!(stack = %name, run_id = %run_id, dry_run = cfg.dry_run, "synth started");

    if !cfg.dry_run {
        EventLog::new(cfg.state_dir, &name).append(SynthEvent::SynthStarted {
            stack: name.clone(),
            run_id: run_id.clone(),
            fleetstack_version: env!("CARGO_PKG_VERSION").to_string(),
        })?;
    }

    let (resolved, template, findings) = synthesize(cfg.config)?;
    let stack_name = resolved.stack_name();
    let log = EventLog::new(cfg.state_dir, &stack_name);

    if !cfg.dry_run {
        record_findings(&log, &findings)?;
    }
    gate_findings(&findings, cfg.allow_findings)?;

    let rendered = codegen::render(&template, cfg.format)?;
    let template_hash = hasher::hash_string(&rendered);

    if cfg.dry_run {
        tracing::info!(stack = %stack_name, resources = template.resources.len(), "dry run, nothing written");
        return Ok(SynthResult {
            stack: stack_name,
            template,
            rendered,
            findings,
            template_path: None,
            lock_path: None,
            template_hash,
        });
    }

    std::fs::create_dir_all(cfg.out_dir)
        .map_err(|e| format!("cannot create dir {}: {}", cfg.out_dir.display(), e))?;
    let template_path = cfg
        .out_dir
        .join(codegen::template_file_name(&stack_name, cfg.format));
    std::fs::write(&template_path, &rendered)
        .map_err(|e| format!("cannot write {}: {}", template_path.display(), e))?;
    tracing::debug!(path = %template_path.display(), "template written");

    let lock = state::new_lock(&resolved, &template, &template_hash)?;
    let lock_path = state::save_lock(cfg.state_dir, &lock)?;

    let total_seconds = start.elapsed().as_secs_f64();
    log.append(SynthEvent::SynthCompleted {
        stack: stack_name.clone(),
        run_id,
        resources: template.resources.len() as u32,
        outputs: template.outputs.len() as u32,
        template_hash: template_hash.clone(),
        total_seconds,
    })?;
    tracing::info!(
        stack = %stack_name,
        resources = template.resources.len(),
        seconds = total_seconds,
        "synth completed"
    );

    Ok(SynthResult {
        stack: stack_name,
        template,
        rendered,
        findings,
        template_path: Some(template_path),
        lock_path: Some(lock_path),
        template_hash,
    })
}

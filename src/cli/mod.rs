//! CLI subcommands — init, validate, synth, plan, audit, graph, outputs,
//! status, drift, schema.

use crate::core::codegen::{self, TemplateFormat};
use crate::core::{audit, planner, resolver, stack, state, synth, types};
use crate::tripwire::drift;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Arguments naming a stack file and its environment.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Path to stack.yaml
    #[arg(short, long, default_value = "stack.yaml")]
    pub file: PathBuf,

    /// Override the environment set in stack.yaml
    #[arg(short, long, env = "FLEETSTACK_ENV")]
    pub env: Option<String>,
}

impl StackArgs {
    fn load(&self) -> Result<types::StackConfig, String> {
        synth::load_config(&self.file, self.env.as_deref())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new fleetstack project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate stack.yaml and define the stack without writing anything
    Validate {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Synthesize the template and record the lock
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Template output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Template format
        #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
        format: TemplateFormat,

        /// Print the template instead of writing it
        #[arg(long)]
        dry_run: bool,

        /// Write the template even if the audit reports findings
        #[arg(long)]
        allow_findings: bool,
    },

    /// Show what the next synth changes relative to the lock
    Plan {
        #[command(flatten)]
        stack: StackArgs,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Run the structural audit over the synthesized template
    Audit {
        #[command(flatten)]
        stack: StackArgs,

        /// Also report deviations from the reference service and health check values
        #[arg(long)]
        strict: bool,
    },

    /// Print the resource dependency graph in creation order
    Graph {
        #[command(flatten)]
        stack: StackArgs,

        /// Print destruction order instead
        #[arg(long)]
        destroy: bool,
    },

    /// List stack outputs and their export names
    Outputs {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Show current state from lock files
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Show a single stack (`{name}-{environment}`)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Detect edits to a written template (tripwire)
    Drift {
        #[command(flatten)]
        stack: StackArgs,

        /// Template output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Template format
        #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
        format: TemplateFormat,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Print the JSON schema of stack.yaml
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { stack } => cmd_validate(&stack),
        Commands::Synth {
            stack,
            out_dir,
            state_dir,
            format,
            dry_run,
            allow_findings,
        } => cmd_synth(&stack, &out_dir, &state_dir, format, dry_run, allow_findings),
        Commands::Plan { stack, state_dir } => cmd_plan(&stack, &state_dir),
        Commands::Audit { stack, strict } => cmd_audit(&stack, strict),
        Commands::Graph { stack, destroy } => cmd_graph(&stack, destroy),
        Commands::Outputs { stack } => cmd_outputs(&stack),
        Commands::Status { state_dir, name } => cmd_status(&state_dir, name.as_deref()),
        Commands::Drift {
            stack,
            out_dir,
            state_dir,
            format,
            tripwire,
        } => cmd_drift(&stack, &out_dir, &state_dir, format, tripwire),
        Commands::Schema => cmd_schema(),
    }
}

const INIT_TEMPLATE: &str = r#"version: "1.0"
name: fleet
environment: dev
description: "Fleet management service"

params: {}

tags: {}

# Every section below is optional; omitted fields take the reference values.
network:
  cidr: 10.0.0.0/16
  max_azs: 2
  nat_gateways: 1

storage:
  bucket_name: "fleet-documents-{{stack.environment}}"
  expiration_days: 90

container:
  image: "fleet-service:latest"
  port: 8080

service:
  desired_count: 2

outputs:
  export_prefix: Fleet
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("stack.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    std::fs::write(&config_path, INIT_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized fleetstack project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(args: &StackArgs) -> Result<(), String> {
    let (resolved, template) = synth::prepare(&args.load()?)?;
    println!(
        "OK: {} ({} resources, {} outputs)",
        resolved.stack_name(),
        template.resources.len(),
        template.outputs.len()
    );
    Ok(())
}

fn cmd_synth(
    args: &StackArgs,
    out_dir: &Path,
    state_dir: &Path,
    format: TemplateFormat,
    dry_run: bool,
    allow_findings: bool,
) -> Result<(), String> {
    let config = args.load()?;
    let result = synth::run(&synth::SynthConfig {
        config: &config,
        state_dir,
        out_dir,
        format,
        dry_run,
        allow_findings,
    })?;

    for f in &result.findings {
        eprintln!("  WARNING: {}", f);
    }
    if dry_run {
        print!("{}", result.rendered);
        return Ok(());
    }
    if let Some(path) = &result.template_path {
        println!("Synthesized {} → {}", result.stack, path.display());
    }
    if let Some(path) = &result.lock_path {
        println!("  Lock: {}", path.display());
    }
    println!(
        "  {} resources, {} outputs, {}",
        result.template.resources.len(),
        result.template.outputs.len(),
        result.template_hash
    );
    Ok(())
}

fn cmd_plan(args: &StackArgs, state_dir: &Path) -> Result<(), String> {
    let (resolved, template) = synth::prepare(&args.load()?)?;
    let name = resolved.stack_name();
    let order = resolver::creation_order(&template)?;
    let lock = state::load_lock(state_dir, &name)?;
    let plan = planner::plan(&name, &template, &order, lock.as_ref())?;
    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::ExecutionPlan) {
    println!("Planning: {} ({} resources)", plan.name, plan.changes.len());
    println!();

    let mut current = None;
    for change in &plan.changes {
        if current != Some(change.component) {
            current = Some(change.component);
            println!("{}:", change.component);
        }
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_audit(args: &StackArgs, strict: bool) -> Result<(), String> {
    let (resolved, template, mut findings) = synth::synthesize(&args.load()?)?;
    if strict {
        findings.extend(audit::audit_reference(&template));
    }

    println!("Public entry points:");
    for decl in audit::public_entry_points(&template) {
        println!("  {} [{}]", decl.logical_id, decl.resource_type);
    }
    println!();

    if findings.is_empty() {
        println!(
            "Audit passed: {} ({} resources)",
            resolved.stack_name(),
            template.resources.len()
        );
        return Ok(());
    }
    for f in &findings {
        println!("  FINDING: {}", f);
    }
    Err(format!("{} audit finding(s)", findings.len()))
}

fn cmd_graph(args: &StackArgs, destroy: bool) -> Result<(), String> {
    let (resolved, template) = synth::prepare(&args.load()?)?;
    let order = if destroy {
        resolver::destruction_order(&template)?
    } else {
        resolver::creation_order(&template)?
    };
    let deps = resolver::dependency_map(&template);

    println!(
        "{} order for {}:",
        if destroy { "Destruction" } else { "Creation" },
        resolved.stack_name()
    );
    for (i, id) in order.iter().enumerate() {
        let resource_type = template
            .resources
            .get(id)
            .map(|d| d.resource_type.as_str())
            .unwrap_or("?");
        println!("  {:>3}. {} [{}]", i + 1, id, resource_type);
        if let Some(edges) = deps.get(id) {
            for dep in edges {
                println!("         ← {}", dep);
            }
        }
    }
    Ok(())
}

fn cmd_outputs(args: &StackArgs) -> Result<(), String> {
    let (resolved, template) = synth::prepare(&args.load()?)?;
    println!("Outputs of {}:", resolved.stack_name());
    for (id, export, value) in stack::output_values(&template) {
        let rendered =
            serde_json::to_string(value).map_err(|e| format!("JSON render error: {}", e))?;
        println!("  {} (export {}) = {}", id, export, rendered);
    }
    Ok(())
}

fn cmd_status(state_dir: &Path, name_filter: Option<&str>) -> Result<(), String> {
    let entries = std::fs::read_dir(state_dir)
        .map_err(|e| format!("cannot read state dir {}: {}", state_dir.display(), e))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| name_filter.is_none_or(|f| f == n))
        .collect();
    names.sort();

    let mut found = false;
    for name in &names {
        let Some(lock) = state::load_lock(state_dir, name)? else {
            continue;
        };
        found = true;
        println!("Stack: {} ({}, {})", lock.stack, lock.environment, lock.region);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Template:  {}", lock.template_hash);
        println!("  Resources: {}", lock.resources.len());
        for (id, rl) in &lock.resources {
            println!("    {}: {} [{}]", id, rl.resource_type, rl.component);
        }
        for (id, export) in &lock.exports {
            println!("  Export: {} → {}", id, export);
        }
        println!();
    }

    if !found {
        println!("No state found. Run `fleetstack synth` first.");
    }
    Ok(())
}

fn cmd_drift(
    args: &StackArgs,
    out_dir: &Path,
    state_dir: &Path,
    format: TemplateFormat,
    tripwire_mode: bool,
) -> Result<(), String> {
    let config = resolver::resolve_config_templates(&args.load()?)?;
    let name = config.stack_name();
    let Some(lock) = state::load_lock(state_dir, &name)? else {
        return Err(format!("no lock for {}; run `fleetstack synth` first", name));
    };

    let path = out_dir.join(codegen::template_file_name(&name, format));
    println!("Checking {} ({} resources)...", path.display(), lock.resources.len());
    let findings = drift::detect_drift(&path, &lock)?;

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }

    for f in &findings {
        println!("  DRIFTED [{}]: {} ({})", f.kind, f.resource_id, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
    }
    drift::record_drift(state_dir, &name, &findings)?;

    println!();
    println!("Drift detected: {} finding(s)", findings.len());
    if tripwire_mode {
        return Err(format!("{} drift finding(s)", findings.len()));
    }
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::StackConfig);
    let json =
        serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON render error: {}", e))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tripwire::eventlog::EventLog;

    const MINIMAL: &str = "version: \"1.0\"\nname: fleet\nenvironment: dev\n";

    fn project(yaml: &str) -> (tempfile::TempDir, StackArgs) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stack.yaml");
        std::fs::write(&file, yaml).unwrap();
        (dir, StackArgs { file, env: None })
    }

    fn synth_into(dir: &Path, args: &StackArgs) {
        cmd_synth(
            args,
            &dir.join("out"),
            &dir.join("state"),
            TemplateFormat::Json,
            false,
            false,
        )
        .unwrap();
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("project");
        std::fs::create_dir_all(&sub).unwrap();
        cmd_init(&sub).unwrap();
        assert!(sub.join("stack.yaml").exists());
        assert!(sub.join("state").is_dir());
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stack.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_init_template_validates() {
        let (_dir, args) = project(INIT_TEMPLATE);
        cmd_validate(&args).unwrap();
    }

    #[test]
    fn test_validate_invalid() {
        let (_dir, args) = project("version: \"2.0\"\nname: fleet\n");
        let err = cmd_validate(&args).unwrap_err();
        assert!(err.contains("validation error"));
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = StackArgs {
            file: dir.path().join("absent.yaml"),
            env: None,
        };
        assert!(cmd_validate(&args).is_err());
    }

    #[test]
    fn test_synth_writes_files() {
        let (dir, args) = project(MINIMAL);
        synth_into(dir.path(), &args);
        assert!(dir.path().join("out/fleet-dev.template.json").exists());
        assert!(dir.path().join("state/fleet-dev/stack.lock.yaml").exists());
        assert!(dir.path().join("state/fleet-dev/events.jsonl").exists());
    }

    #[test]
    fn test_synth_env_override() {
        let (dir, mut args) = project(MINIMAL);
        args.env = Some("prod".to_string());
        cmd_synth(
            &args,
            &dir.path().join("out"),
            &dir.path().join("state"),
            TemplateFormat::Yaml,
            false,
            false,
        )
        .unwrap();
        assert!(dir.path().join("out/fleet-prod.template.yaml").exists());
    }

    #[test]
    fn test_synth_dry_run() {
        let (dir, args) = project(MINIMAL);
        cmd_synth(
            &args,
            &dir.path().join("out"),
            &dir.path().join("state"),
            TemplateFormat::Json,
            true,
            false,
        )
        .unwrap();
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn test_plan_before_and_after_synth() {
        let (dir, args) = project(MINIMAL);
        let state_dir = dir.path().join("state");
        cmd_plan(&args, &state_dir).unwrap();
        synth_into(dir.path(), &args);
        cmd_plan(&args, &state_dir).unwrap();
    }

    #[test]
    fn test_print_plan_symbols() {
        let config = types::StackConfig::minimal("fleet", "dev");
        let template = stack::define_stack(&config).unwrap();
        let order = resolver::creation_order(&template).unwrap();
        let plan = planner::plan("fleet-dev", &template, &order, None).unwrap();
        print_plan(&plan);
    }

    #[test]
    fn test_audit_passes_reference_stack() {
        let (_dir, args) = project(MINIMAL);
        cmd_audit(&args, false).unwrap();
        cmd_audit(&args, true).unwrap();
    }

    #[test]
    fn test_audit_passes_internal_balancer() {
        let (_dir, args) = project(&format!("{}load_balancer:\n  internet_facing: false\n", MINIMAL));
        cmd_audit(&args, false).unwrap();
    }

    #[test]
    fn test_strict_audit_reports_tuned_replicas() {
        let (_dir, args) = project(&format!("{}service:\n  desired_count: 4\n", MINIMAL));
        cmd_audit(&args, false).unwrap();
        let err = cmd_audit(&args, true).unwrap_err();
        assert_eq!(err, "1 audit finding(s)");
    }

    #[test]
    fn test_graph_both_directions() {
        let (_dir, args) = project(MINIMAL);
        cmd_graph(&args, false).unwrap();
        cmd_graph(&args, true).unwrap();
    }

    #[test]
    fn test_outputs() {
        let (_dir, args) = project(MINIMAL);
        cmd_outputs(&args).unwrap();
    }

    #[test]
    fn test_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path(), None).unwrap();
    }

    #[test]
    fn test_status_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_status(&dir.path().join("nope"), None).is_err());
    }

    #[test]
    fn test_status_with_lock_and_stray_file() {
        let (dir, args) = project(MINIMAL);
        synth_into(dir.path(), &args);
        let state_dir = dir.path().join("state");
        std::fs::write(state_dir.join("notes.txt"), "ignored").unwrap();
        cmd_status(&state_dir, None).unwrap();
        cmd_status(&state_dir, Some("fleet-dev")).unwrap();
        cmd_status(&state_dir, Some("other")).unwrap();
    }

    #[test]
    fn test_drift_without_lock() {
        let (dir, args) = project(MINIMAL);
        let err = cmd_drift(
            &args,
            &dir.path().join("out"),
            &dir.path().join("state"),
            TemplateFormat::Json,
            false,
        )
        .unwrap_err();
        assert!(err.contains("no lock"));
    }

    #[test]
    fn test_drift_clean_then_tripwire() {
        let (dir, args) = project(MINIMAL);
        synth_into(dir.path(), &args);
        let out = dir.path().join("out");
        let state_dir = dir.path().join("state");
        cmd_drift(&args, &out, &state_dir, TemplateFormat::Json, true).unwrap();

        let path = out.join("fleet-dev.template.json");
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("alias/aws/sqs", "alias/custom");
        std::fs::write(&path, edited).unwrap();

        // report-only mode succeeds, tripwire mode fails
        cmd_drift(&args, &out, &state_dir, TemplateFormat::Json, false).unwrap();
        let err = cmd_drift(&args, &out, &state_dir, TemplateFormat::Json, true).unwrap_err();
        assert!(err.contains("drift finding"));

        let events = EventLog::new(&state_dir, "fleet-dev").read().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e.event, types::SynthEvent::DriftDetected { .. })));
    }

    #[test]
    fn test_schema() {
        cmd_schema().unwrap();
        let schema = schemars::schema_for!(types::StackConfig);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["properties"]["network"].is_object());
    }

    #[test]
    fn test_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        dispatch(Commands::Init {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        let stack = StackArgs {
            file: dir.path().join("stack.yaml"),
            env: None,
        };
        dispatch(Commands::Validate {
            stack: stack.clone(),
        })
        .unwrap();
        dispatch(Commands::Synth {
            stack: stack.clone(),
            out_dir: dir.path().join("out"),
            state_dir: dir.path().join("state"),
            format: TemplateFormat::Json,
            dry_run: false,
            allow_findings: false,
        })
        .unwrap();
        dispatch(Commands::Status {
            state_dir: dir.path().join("state"),
            name: None,
        })
        .unwrap();
        dispatch(Commands::Schema).unwrap();
    }
}

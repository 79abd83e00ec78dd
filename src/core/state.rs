//! Lock file management — load, save (atomic), path derivation.

use super::resolver;
use super::template::Template;
use super::types::{ResourceLock, StackConfig, StackLock};
use crate::tripwire::hasher;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const LOCK_SCHEMA: &str = "1.0";

/// Per-stack directory inside the state directory.
pub fn stack_dir(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack)
}

/// Derive the lock file path for a stack within the state directory.
pub fn lock_file_path(state_dir: &Path, stack: &str) -> PathBuf {
    stack_dir(state_dir, stack).join("stack.lock.yaml")
}

/// Load a stack's lock file. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stack: &str) -> Result<Option<StackLock>, String> {
    let path = lock_file_path(state_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let lock: StackLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid lock file {}: {}", path.display(), e))?;
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StackLock) -> Result<PathBuf, String> {
    let path = lock_file_path(state_dir, &lock.stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    tracing::debug!(path = %path.display(), resources = lock.resources.len(), "lock saved");
    Ok(path)
}

/// Build the lock for a synthesized template. Resources are recorded in
/// creation order.
pub fn new_lock(
    config: &StackConfig,
    template: &Template,
    template_hash: &str,
) -> Result<StackLock, String> {
    use crate::tripwire::eventlog::now_iso8601;

    let mut resources = IndexMap::new();
    for id in resolver::creation_order(template)? {
        let Some(decl) = template.resources.get(&id) else {
            continue;
        };
        resources.insert(
            id,
            ResourceLock {
                resource_type: decl.resource_type.clone(),
                component: decl.component,
                hash: hasher::hash_declaration(decl)?,
                depends_on: decl.dependencies(),
            },
        );
    }

    Ok(StackLock {
        schema: LOCK_SCHEMA.to_string(),
        stack: config.stack_name(),
        environment: config.environment.clone(),
        region: config.region.clone(),
        generated_at: now_iso8601(),
        generator: format!("fleetstack {}", env!("CARGO_PKG_VERSION")),
        template_hash: template_hash.to_string(),
        resources,
        exports: template
            .outputs
            .values()
            .map(|o| (o.logical_id.clone(), o.export_name.clone()))
            .collect(),
    })
}

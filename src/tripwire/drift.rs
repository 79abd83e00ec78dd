//! Drift detection — compare a rendered template on disk to lock hashes.
//!
//! The whole-file hash is checked first. Only when it differs are resource
//! records re-hashed one by one, so an untouched file costs one read.

use crate::core::codegen;
use crate::core::types::{StackLock, SynthEvent};
use crate::tripwire::eventlog::EventLog;
use crate::tripwire::hasher;
use std::fmt;
use std::path::Path;

/// Pseudo resource id used for findings about the file as a whole.
pub const TEMPLATE_ID: &str = "<template>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Record present in both, hash differs
    Modified,
    /// Locked record absent from the file (or the file itself is gone)
    Missing,
    /// Record in the file the lock does not know
    Unexpected,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modified => write!(f, "modified"),
            Self::Missing => write!(f, "missing"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// A single drift finding.
#[derive(Debug, Clone)]
pub struct DriftFinding {
    pub resource_id: String,
    pub kind: DriftKind,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

impl DriftFinding {
    fn new(id: &str, kind: DriftKind, expected: &str, actual: &str, detail: String) -> Self {
        Self {
            resource_id: id.to_string(),
            kind,
            expected_hash: expected.to_string(),
            actual_hash: actual.to_string(),
            detail,
        }
    }
}

/// Check a template file against its lock.
pub fn detect_drift(template_path: &Path, lock: &StackLock) -> Result<Vec<DriftFinding>, String> {
    if !template_path.exists() {
        return Ok(vec![DriftFinding::new(
            TEMPLATE_ID,
            DriftKind::Missing,
            &lock.template_hash,
            "MISSING",
            format!("{} does not exist", template_path.display()),
        )]);
    }

    let file_hash = hasher::hash_file(template_path)?;
    if file_hash == lock.template_hash {
        tracing::debug!(path = %template_path.display(), "template unchanged");
        return Ok(Vec::new());
    }

    let doc = codegen::parse_template_file(template_path)?;
    let empty = serde_json::Map::new();
    let resources = doc
        .get("Resources")
        .and_then(|r| r.as_object())
        .unwrap_or(&empty);

    let mut findings = Vec::new();
    for (id, rl) in &lock.resources {
        match resources.get(id) {
            None => findings.push(DriftFinding::new(
                id,
                DriftKind::Missing,
                &rl.hash,
                "MISSING",
                format!("{} ({}) removed from template", id, rl.resource_type),
            )),
            Some(record) => {
                let actual = hasher::hash_json(record);
                if actual != rl.hash {
                    findings.push(DriftFinding::new(
                        id,
                        DriftKind::Modified,
                        &rl.hash,
                        &actual,
                        format!("{} ({}) edited outside fleetstack", id, rl.resource_type),
                    ));
                }
            }
        }
    }
    for (id, record) in resources {
        if lock.resources.contains_key(id) {
            continue;
        }
        let resource_type = record.get("Type").and_then(|t| t.as_str()).unwrap_or("?");
        findings.push(DriftFinding::new(
            id,
            DriftKind::Unexpected,
            "NONE",
            &hasher::hash_json(record),
            format!("{} ({}) not in lock", id, resource_type),
        ));
    }

    if findings.is_empty() {
        // Records match; the change is in outputs, metadata or formatting.
        findings.push(DriftFinding::new(
            TEMPLATE_ID,
            DriftKind::Modified,
            &lock.template_hash,
            &file_hash,
            format!("{} changed outside resource records", template_path.display()),
        ));
    }
    Ok(findings)
}

/// Append a `drift_detected` event per finding to the stack's event log.
pub fn record_drift(
    state_dir: &Path,
    stack: &str,
    findings: &[DriftFinding],
) -> Result<(), String> {
    let log = EventLog::new(state_dir, stack);
    for f in findings {
        tracing::warn!(resource = %f.resource_id, kind = %f.kind, "drift detected");
        log.append(SynthEvent::DriftDetected {
            stack: stack.to_string(),
            resource: f.resource_id.clone(),
            expected_hash: f.expected_hash.clone(),
            actual_hash: f.actual_hash.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codegen::{render, TemplateFormat};
    use crate::core::stack::define_stack;
    use crate::core::state;
    use crate::core::types::StackConfig;
    use std::path::PathBuf;

    fn synth_to(dir: &Path, format: TemplateFormat) -> (PathBuf, StackLock) {
        let config = StackConfig::minimal("fleet", "dev");
        let template = define_stack(&config).unwrap();
        let path = dir.join(codegen::template_file_name("fleet-dev", format));
        std::fs::write(&path, render(&template, format).unwrap()).unwrap();
        let hash = hasher::hash_file(&path).unwrap();
        (path, state::new_lock(&config, &template, &hash).unwrap())
    }

    fn edit_json(path: &Path, f: impl FnOnce(&mut serde_json::Value)) {
        let mut doc = codegen::parse_template_file(path).unwrap();
        f(&mut doc);
        std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    }

    #[test]
    fn test_no_drift() {
        let dir = tempfile::tempdir().unwrap();
        let (path, lock) = synth_to(dir.path(), TemplateFormat::Json);
        assert!(detect_drift(&path, &lock).unwrap().is_empty());
    }

    #[test]
    fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let (path, lock) = synth_to(dir.path(), TemplateFormat::Json);
        std::fs::remove_file(&path).unwrap();
        let findings = detect_drift(&path, &lock).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource_id, TEMPLATE_ID);
        assert_eq!(findings[0].kind, DriftKind::Missing);
    }

    #[test]
    fn test_modified_record() {
        let dir = tempfile::tempdir().unwrap();
        let (path, lock) = synth_to(dir.path(), TemplateFormat::Json);
        edit_json(&path, |doc| {
            doc["Resources"]["AppQueue"]["Properties"]["VisibilityTimeout"] = 5.into();
        });
        let findings = detect_drift(&path, &lock).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource_id, "AppQueue");
        assert_eq!(findings[0].kind, DriftKind::Modified);
        assert_ne!(findings[0].actual_hash, findings[0].expected_hash);
    }

    #[test]
    fn test_removed_and_added_records() {
        let dir = tempfile::tempdir().unwrap();
        let (path, lock) = synth_to(dir.path(), TemplateFormat::Json);
        edit_json(&path, |doc| {
            let resources = doc["Resources"].as_object_mut().unwrap();
            resources.remove("AppQueue");
            resources.insert(
                "Extra".to_string(),
                serde_json::json!({"Type": "AWS::SNS::Topic"}),
            );
        });
        let findings = detect_drift(&path, &lock).unwrap();
        let kinds: Vec<_> = findings
            .iter()
            .map(|f| (f.resource_id.as_str(), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("AppQueue", DriftKind::Missing), ("Extra", DriftKind::Unexpected)]
        );
        assert!(findings[1].detail.contains("AWS::SNS::Topic"));
    }

    #[test]
    fn test_reformatting_is_file_level_drift() {
        let dir = tempfile::tempdir().unwrap();
        let (path, lock) = synth_to(dir.path(), TemplateFormat::Json);
        let compact = codegen::parse_template_file(&path).unwrap().to_string();
        std::fs::write(&path, compact).unwrap();
        let findings = detect_drift(&path, &lock).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource_id, TEMPLATE_ID);
        assert_eq!(findings[0].kind, DriftKind::Modified);
    }

    #[test]
    fn test_yaml_template_records_match_lock() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut lock) = synth_to(dir.path(), TemplateFormat::Yaml);
        // force the per-record comparison
        lock.template_hash = "blake3:stale".to_string();
        let findings = detect_drift(&path, &lock).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource_id, TEMPLATE_ID);
    }

    #[test]
    fn test_record_drift_events() {
        let dir = tempfile::tempdir().unwrap();
        let findings = vec![DriftFinding::new(
            "AppQueue",
            DriftKind::Modified,
            "blake3:a",
            "blake3:b",
            "edited".to_string(),
        )];
        record_drift(dir.path(), "fleet-dev", &findings).unwrap();
        let events = EventLog::new(dir.path(), "fleet-dev").read().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].event,
            SynthEvent::DriftDetected { resource, .. } if resource == "AppQueue"
        ));
    }
}

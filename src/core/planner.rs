//! Plan generation — diff a fresh synthesis against the last lock.
//!
//! Creations and updates are listed in creation order of the new template.
//! Records that only the lock knows about are destroyed, dependents first.

use super::resolver;
use super::template::{Declaration, Template};
use super::types::*;
use crate::tripwire::hasher;
use indexmap::IndexMap;

/// Generate a plan by comparing the synthesized template to the lock.
pub fn plan(
    stack: &str,
    template: &Template,
    creation_order: &[String],
    lock: Option<&StackLock>,
) -> Result<ExecutionPlan, String> {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut unchanged = 0u32;

    for logical_id in creation_order {
        let Some(decl) = template.resources.get(logical_id) else {
            continue;
        };
        let action = determine_action(decl, lock)?;
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::NoOp => unchanged += 1,
            PlanAction::Destroy => {}
        }
        changes.push(PlannedChange {
            logical_id: logical_id.clone(),
            resource_type: decl.resource_type.clone(),
            component: decl.component,
            description: describe_action(logical_id, &decl.resource_type, &action),
            action,
        });
    }

    let mut to_destroy = 0u32;
    if let Some(lock) = lock {
        for logical_id in destroy_order(lock) {
            if template.resources.contains_key(&logical_id) {
                continue;
            }
            let Some(rl) = lock.resources.get(&logical_id) else {
                continue;
            };
            to_destroy += 1;
            changes.push(PlannedChange {
                description: describe_action(&logical_id, &rl.resource_type, &PlanAction::Destroy),
                logical_id,
                resource_type: rl.resource_type.clone(),
                component: rl.component,
                action: PlanAction::Destroy,
            });
        }
    }

    Ok(ExecutionPlan {
        name: stack.to_string(),
        changes,
        creation_order: creation_order.to_vec(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    })
}

/// Determine what the next deployment would do to one record.
fn determine_action(decl: &Declaration, lock: Option<&StackLock>) -> Result<PlanAction, String> {
    let Some(rl) = lock.and_then(|l| l.resources.get(&decl.logical_id)) else {
        return Ok(PlanAction::Create);
    };
    if rl.resource_type != decl.resource_type {
        return Ok(PlanAction::Update);
    }
    if rl.hash == hasher::hash_declaration(decl)? {
        Ok(PlanAction::NoOp)
    } else {
        Ok(PlanAction::Update)
    }
}

/// Reverse dependency order of the locked records. Falls back to reverse
/// lock order if the recorded edges do not form a DAG.
fn destroy_order(lock: &StackLock) -> Vec<String> {
    let nodes: IndexMap<String, Vec<String>> = lock
        .resources
        .iter()
        .map(|(id, rl)| {
            let deps = rl
                .depends_on
                .iter()
                .filter(|d| lock.resources.contains_key(*d))
                .cloned()
                .collect();
            (id.clone(), deps)
        })
        .collect();
    let mut order = resolver::topo_sort(&nodes).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "lock dependencies unusable, destroying in reverse lock order");
        lock.resources.keys().cloned().collect()
    });
    order.reverse();
    order
}

/// Generate a human-readable description of a planned action.
fn describe_action(logical_id: &str, resource_type: &str, action: &PlanAction) -> String {
    match action {
        PlanAction::Create => format!("{}: create {}", logical_id, resource_type),
        PlanAction::Update => format!("{}: update {} (properties changed)", logical_id, resource_type),
        PlanAction::Destroy => format!("{}: destroy {}", logical_id, resource_type),
        PlanAction::NoOp => format!("{}: no changes", logical_id),
    }
}

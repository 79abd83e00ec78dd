//! Template resolution and dependency ordering.
//!
//! Resolves `{{params.key}}` and `{{stack.field}}` templates in the string
//! fields of a `StackConfig`. Orders a synthesized template's records with
//! Kahn's algorithm over property references and `DependsOn` edges, using
//! alphabetical tie-breaking so the order is deterministic.

use super::template::Template;
use super::types::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Values available to `{{...}}` templates.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub params: &'a HashMap<String, serde_yaml_ng::Value>,
    pub name: &'a str,
    pub environment: &'a str,
    pub region: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn for_config(config: &'a StackConfig) -> Self {
        Self {
            params: &config.params,
            name: &config.name,
            environment: &config.environment,
            region: &config.region,
        }
    }
}

/// Resolve all template variables in a string.
pub fn resolve_template(template: &str, ctx: &TemplateContext<'_>) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            ctx.params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| format!("unknown param: {}", param_key))?
        } else if let Some(field) = key.strip_prefix("stack.") {
            match field {
                "name" => ctx.name.to_string(),
                "environment" => ctx.environment.to_string(),
                "region" => ctx.region.to_string(),
                _ => return Err(format!("unknown stack field: {}", field)),
            }
        } else {
            return Err(format!("unknown template variable: {}", key));
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

fn resolve_in_place(field: &mut String, ctx: &TemplateContext<'_>) -> Result<(), String> {
    if field.contains("{{") {
        *field = resolve_template(field, ctx)?;
    }
    Ok(())
}

/// Resolve templates in every string field of the config. The stack name,
/// environment and region are taken literally.
pub fn resolve_config_templates(config: &StackConfig) -> Result<StackConfig, String> {
    let ctx = TemplateContext::for_config(config);
    let mut resolved = config.clone();

    if let Some(ref mut description) = resolved.description {
        resolve_in_place(description, &ctx)?;
    }
    for value in resolved.tags.values_mut() {
        resolve_in_place(value, &ctx)?;
    }
    resolve_in_place(&mut resolved.network.cidr, &ctx)?;
    resolve_in_place(&mut resolved.storage.bucket_name, &ctx)?;
    resolve_in_place(&mut resolved.secret.name, &ctx)?;
    resolve_in_place(&mut resolved.secret.username, &ctx)?;
    resolve_in_place(&mut resolved.database.engine_version, &ctx)?;
    resolve_in_place(&mut resolved.database.database_name, &ctx)?;
    resolve_in_place(&mut resolved.container.name, &ctx)?;
    resolve_in_place(&mut resolved.container.image, &ctx)?;
    resolve_in_place(&mut resolved.container.log_stream_prefix, &ctx)?;
    for value in resolved.container.environment.values_mut() {
        resolve_in_place(value, &ctx)?;
    }
    for arg in resolved.container.health_check.command.iter_mut() {
        resolve_in_place(arg, &ctx)?;
    }
    resolve_in_place(&mut resolved.target.health_check_path, &ctx)?;
    resolve_in_place(&mut resolved.outputs.export_prefix, &ctx)?;

    Ok(resolved)
}

/// Topological order of `nodes` (id -> ids it depends on), using Kahn's
/// algorithm with sorted tie-breaking.
pub fn topo_sort(nodes: &IndexMap<String, Vec<String>>) -> Result<Vec<String>, String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for id in nodes.keys() {
        in_degree.insert(id, 0);
        dependents.insert(id, Vec::new());
    }

    for (id, deps) in nodes {
        let unique: HashSet<&str> = deps.iter().map(String::as_str).collect();
        for dep in unique {
            let Some(list) = dependents.get_mut(dep) else {
                return Err(format!("'{}' depends on unknown '{}'", id, dep));
            };
            list.push(id);
            *in_degree.entry(id).or_insert(0) += 1;
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<&str> = ready.into_iter().collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        for neighbor in dependents.get(current).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(degree) = in_degree.get_mut(neighbor) {
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(neighbor);
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != nodes.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut cycle_members: Vec<&str> = nodes
            .keys()
            .map(String::as_str)
            .filter(|id| !ordered.contains(id))
            .collect();
        cycle_members.sort_unstable();
        return Err(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        ));
    }

    Ok(order)
}

/// Dependency map of a template: logical id -> ids it needs first.
pub fn dependency_map(template: &Template) -> IndexMap<String, Vec<String>> {
    template
        .resources
        .iter()
        .map(|(id, decl)| (id.clone(), decl.dependencies()))
        .collect()
}

/// Order in which the platform may create the template's records.
pub fn creation_order(template: &Template) -> Result<Vec<String>, String> {
    topo_sort(&dependency_map(template))
}

/// Order in which records are torn down: the reverse of creation.
pub fn destruction_order(template: &Template) -> Result<Vec<String>, String> {
    let mut order = creation_order(template)?;
    order.reverse();
    Ok(order)
}

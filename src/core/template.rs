//! Template model — resource declarations, intrinsic values and outputs.
//!
//! A `Template` serializes to the CloudFormation JSON/YAML shape:
//! `AWSTemplateFormatVersion`, `Description`, `Resources`, `Outputs`.
//! Maps are `IndexMap`s so rendering keeps declaration order.

use super::types::Component;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Template format version emitted in every template.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// Property map of a declaration.
pub type Props = IndexMap<String, Value>;

/// Build a property map from literal entries.
pub fn props<const N: usize>(entries: [(&str, Value); N]) -> Props {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Build a map value from literal entries.
pub fn map<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Map(props(entries))
}

/// Stack-level pseudo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    Region,
    StackName,
}

impl Pseudo {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Region => "AWS::Region",
            Self::StackName => "AWS::StackName",
        }
    }
}

/// A property value: a literal or an intrinsic function.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Props),
    /// `{"Ref": id}`
    Ref(String),
    /// `{"Fn::GetAtt": [id, attr]}`
    GetAtt(String, String),
    /// `{"Fn::Join": [sep, [...]]}`
    Join(String, Vec<Value>),
    /// `{"Fn::Select": [index, list]}`
    Select(usize, Box<Value>),
    /// `{"Fn::GetAZs": ""}`, the zones of the deployment region
    GetAzs,
    /// `{"Ref": "AWS::Region"}` and friends
    Pseudo(Pseudo),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn reference(id: impl Into<String>) -> Self {
        Self::Ref(id.into())
    }

    pub fn get_att(id: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::GetAtt(id.into(), attr.into())
    }

    pub fn join(sep: impl Into<String>, parts: Vec<Value>) -> Self {
        Self::Join(sep.into(), parts)
    }

    /// Availability zone `index` of the deployment region.
    pub fn az(index: usize) -> Self {
        Self::Select(index, Box::new(Self::GetAzs))
    }

    pub fn list_of_refs(ids: &[String]) -> Self {
        Self::List(ids.iter().map(|id| Self::Ref(id.clone())).collect())
    }

    /// Logical ids this value points at (pseudo parameters excluded).
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Ref(id) | Self::GetAtt(id, _) => out.push(id),
            Self::List(items) | Self::Join(_, items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(m) => {
                for v in m.values() {
                    v.collect_references(out);
                }
            }
            Self::Select(_, inner) => inner.collect_references(out),
            Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::GetAzs
            | Self::Pseudo(_) => {}
        }
    }

    /// Literal string content, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Field of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(n) => serializer.serialize_f64(*n),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(m) => {
                let mut out = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Self::Ref(id) => single_entry(serializer, "Ref", id),
            Self::GetAtt(id, attr) => single_entry(serializer, "Fn::GetAtt", &[id, attr]),
            Self::Join(sep, parts) => {
                single_entry(serializer, "Fn::Join", &(sep, parts))
            }
            Self::Select(index, list) => {
                single_entry(serializer, "Fn::Select", &(index, list))
            }
            Self::GetAzs => single_entry(serializer, "Fn::GetAZs", ""),
            Self::Pseudo(p) => single_entry(serializer, "Ref", p.name()),
        }
    }
}

fn single_entry<S: Serializer, T: Serialize + ?Sized>(
    serializer: S,
    key: &str,
    value: &T,
) -> Result<S::Ok, S::Error> {
    let mut out = serializer.serialize_map(Some(1))?;
    out.serialize_entry(key, value)?;
    out.end()
}

/// What happens to the physical resource when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// One declared resource record.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub logical_id: String,
    pub resource_type: String,
    pub component: Component,
    pub properties: Props,
    /// Explicit ordering edges beyond property references
    pub depends_on: Vec<String>,
    pub deletion_policy: Option<RemovalPolicy>,
    pub update_replace_policy: Option<RemovalPolicy>,
}

impl Declaration {
    pub fn new(logical_id: &str, resource_type: &str, component: Component) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            component,
            properties: Props::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn with_props(mut self, properties: Props) -> Self {
        self.properties = properties;
        self
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        if !self.depends_on.iter().any(|d| d == id) {
            self.depends_on.push(id.to_string());
        }
        self
    }

    /// Set both deletion and update-replace policies.
    pub fn removal(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Every logical id this declaration needs to exist first, deduplicated,
    /// in first-seen order.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        let referenced = self
            .properties
            .values()
            .flat_map(|v| v.references())
            .chain(self.depends_on.iter().map(String::as_str));
        for id in referenced {
            if !deps.iter().any(|d| d == id) {
                deps.push(id.to_string());
            }
        }
        deps
    }
}

impl Serialize for Declaration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(None)?;
        out.serialize_entry("Type", &self.resource_type)?;
        if !self.properties.is_empty() {
            out.serialize_entry("Properties", &self.properties)?;
        }
        if !self.depends_on.is_empty() {
            out.serialize_entry("DependsOn", &self.depends_on)?;
        }
        if let Some(policy) = self.update_replace_policy {
            out.serialize_entry("UpdateReplacePolicy", &policy)?;
        }
        if let Some(policy) = self.deletion_policy {
            out.serialize_entry("DeletionPolicy", &policy)?;
        }
        out.serialize_entry(
            "Metadata",
            &map([("fleetstack:component", Value::Str(self.component.to_string()))]),
        )?;
        out.end()
    }
}

/// A named, exported stack output.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub logical_id: String,
    pub value: Value,
    pub description: String,
    pub export_name: String,
}

impl Serialize for Output {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(3))?;
        out.serialize_entry("Description", &self.description)?;
        out.serialize_entry("Value", &self.value)?;
        out.serialize_entry("Export", &map([("Name", Value::str(&self.export_name))]))?;
        out.end()
    }
}

/// A complete synthesized template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub description: String,
    pub resources: IndexMap<String, Declaration>,
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    /// Declarations of one cloud resource type, in declaration order.
    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Declaration> {
        self.resources
            .values()
            .filter(move |d| d.resource_type == resource_type)
    }

    pub fn component(&self, component: Component) -> impl Iterator<Item = &Declaration> {
        self.resources
            .values()
            .filter(move |d| d.component == component)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(None)?;
        out.serialize_entry("AWSTemplateFormatVersion", FORMAT_VERSION)?;
        out.serialize_entry("Description", &self.description)?;
        out.serialize_entry("Resources", &self.resources)?;
        if !self.outputs.is_empty() {
            out.serialize_entry("Outputs", &self.outputs)?;
        }
        out.end()
    }
}

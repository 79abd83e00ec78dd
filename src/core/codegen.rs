//! Template rendering — JSON or YAML, in declaration order.

use super::template::Template;
use clap::ValueEnum;
use std::path::Path;

/// Output format of the rendered template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(format!(
                "cannot infer template format of {} (expected .json, .yaml or .yml)",
                path.display()
            )),
        }
    }
}

/// File name of a stack's rendered template.
pub fn template_file_name(stack: &str, format: TemplateFormat) -> String {
    format!("{}.template.{}", stack, format.extension())
}

/// Render a template. JSON is pretty-printed with a trailing newline.
pub fn render(template: &Template, format: TemplateFormat) -> Result<String, String> {
    match format {
        TemplateFormat::Json => serde_json::to_string_pretty(template)
            .map(|s| s + "\n")
            .map_err(|e| format!("JSON render error: {}", e)),
        TemplateFormat::Yaml => {
            serde_yaml_ng::to_string(template).map_err(|e| format!("YAML render error: {}", e))
        }
    }
}

/// Parse a rendered template file back into a generic JSON value.
pub fn parse_template_file(path: &Path) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    match TemplateFormat::from_path(path)? {
        TemplateFormat::Json => serde_json::from_str(&content)
            .map_err(|e| format!("invalid template {}: {}", path.display(), e)),
        TemplateFormat::Yaml => serde_yaml_ng::from_str(&content)
            .map_err(|e| format!("invalid template {}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::define_stack;
    use crate::core::types::StackConfig;

    fn reference() -> Template {
        define_stack(&StackConfig::minimal("fleet", "dev")).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            template_file_name("fleet-dev", TemplateFormat::Json),
            "fleet-dev.template.json"
        );
        assert_eq!(
            template_file_name("fleet-dev", TemplateFormat::Yaml),
            "fleet-dev.template.yaml"
        );
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            TemplateFormat::from_path(Path::new("a.template.yml")).unwrap(),
            TemplateFormat::Yaml
        );
        assert!(TemplateFormat::from_path(Path::new("a.txt")).is_err());
    }

    #[test]
    fn test_render_json_shape() {
        let json = render(&reference(), TemplateFormat::Json).unwrap();
        assert!(json.ends_with("}\n"));
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(v["Resources"]["AppQueue"]["Type"], "AWS::SQS::Queue");
        assert_eq!(v["Outputs"]["S3BucketName"]["Export"]["Name"], "FleetS3Bucket");
    }

    #[test]
    fn test_render_keeps_declaration_order() {
        let json = render(&reference(), TemplateFormat::Json).unwrap();
        let vpc = json.find("\"FleetVPC\"").unwrap();
        let service = json.find("\"FleetService\"").unwrap();
        assert!(vpc < service);
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render(&reference(), TemplateFormat::Yaml).unwrap();
        let b = render(&reference(), TemplateFormat::Yaml).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_yaml_and_json_agree() {
        let dir = tempfile::tempdir().unwrap();
        let t = reference();
        let json_path = dir.path().join("t.template.json");
        let yaml_path = dir.path().join("t.template.yaml");
        std::fs::write(&json_path, render(&t, TemplateFormat::Json).unwrap()).unwrap();
        std::fs::write(&yaml_path, render(&t, TemplateFormat::Yaml).unwrap()).unwrap();
        assert_eq!(
            parse_template_file(&json_path).unwrap(),
            parse_template_file(&yaml_path).unwrap()
        );
    }
}

//! BLAKE3 hashing for template files and resource records.
//!
//! Resource hashes are taken over canonical JSON: object keys sorted, no
//! whitespace. The same hash is recomputed from a record read back from a
//! rendered template (JSON or YAML), so drift checks compare like with like.

use crate::core::template::Declaration;
use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Canonical JSON text of a value: keys sorted, compact.
pub fn canonical_json(value: &serde_json::Value) -> String {
    // serde_json's Map is a BTreeMap here, so keys come out sorted.
    value.to_string()
}

/// Hash an already-parsed JSON value canonically.
pub fn hash_json(value: &serde_json::Value) -> String {
    hash_string(&canonical_json(value))
}

/// Hash a declared resource record as it would appear in the template.
pub fn hash_declaration(decl: &Declaration) -> Result<String, String> {
    let value = serde_json::to_value(decl)
        .map_err(|e| format!("cannot serialize '{}': {}", decl.logical_id, e))?;
    Ok(hash_json(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::Value;
    use crate::core::types::Component;

    fn queue() -> Declaration {
        Declaration::new("Q", "AWS::SQS::Queue", Component::Queue)
            .prop("VisibilityTimeout", 300u32)
            .prop("KmsMasterKeyId", "alias/aws/sqs")
    }

    #[test]
    fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");
        std::fs::write(&path, "{}").unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("{}"));
    }

    #[test]
    fn test_hash_file_not_found() {
        assert!(hash_file(Path::new("/nonexistent/file.json")).is_err());
    }

    #[test]
    fn test_hash_string() {
        let h1 = hash_string("hello");
        assert_eq!(h1, hash_string("hello"));
        assert_ne!(h1, hash_string("world"));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        assert_eq!(canonical_json(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn test_declaration_hash_independent_of_property_order() {
        let reordered = Declaration::new("Q", "AWS::SQS::Queue", Component::Queue)
            .prop("KmsMasterKeyId", "alias/aws/sqs")
            .prop("VisibilityTimeout", 300u32);
        assert_eq!(
            hash_declaration(&queue()).unwrap(),
            hash_declaration(&reordered).unwrap()
        );
    }

    #[test]
    fn test_declaration_hash_changes_with_properties() {
        let changed = queue().prop("VisibilityTimeout", 30u32);
        assert_ne!(
            hash_declaration(&queue()).unwrap(),
            hash_declaration(&changed).unwrap()
        );
    }

    #[test]
    fn test_declaration_hash_matches_rendered_yaml() {
        let decl = queue().prop("Capacity", Value::Float(2.0));
        let yaml = serde_yaml_ng::to_string(&decl).unwrap();
        let parsed: serde_json::Value = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(hash_declaration(&decl).unwrap(), hash_json(&parsed));
    }
}

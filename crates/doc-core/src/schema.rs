use std::collections::HashMap;
use std::fs;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// One field-level validation failure, matching the `{field, message}` shape
/// of the schema-validator collaborator contract (§6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema directory {path}: {source}")]
    ReadDir { path: String, source: std::io::Error },
    #[error("failed to read schema file {path}: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("schema file {path} is not valid JSON: {source}")]
    InvalidJson { path: String, source: serde_json::Error },
    #[error("schema file {path} does not compile as a JSON Schema: {source}")]
    InvalidSchema { path: String, source: String },
    #[error("unknown doc_type `{0}`")]
    UnknownDocType(String),
}

/// Compiled per-doc-type JSON Schemas (Draft 2020-12), loaded once at
/// activation and held for the lifetime of the tenant session.
pub struct SchemaRegistry {
    schemas: HashMap<String, Validator>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self { schemas: HashMap::new() }
    }

    /// Loads every `<doc_type>.json` / `<doc_type>.schema.json` file in `dir`.
    /// A missing directory yields an empty registry: custom doc types are
    /// opt-in (§6.4 `custom_doc_types`).
    pub fn load_from_dir(dir: &Path) -> Result<Self, SchemaError> {
        if !dir.exists() {
            return Ok(Self::empty());
        }

        let entries = fs::read_dir(dir).map_err(|source| SchemaError::ReadDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut schemas = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| SchemaError::ReadDir {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let doc_type = doc_type_from_filename(&path);
            let raw = fs::read_to_string(&path).map_err(|source| SchemaError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;
            let schema_value: JsonValue =
                serde_json::from_str(&raw).map_err(|source| SchemaError::InvalidJson {
                    path: path.display().to_string(),
                    source,
                })?;
            let compiled = jsonschema::validator_for(&schema_value).map_err(|err| {
                SchemaError::InvalidSchema {
                    path: path.display().to_string(),
                    source: err.to_string(),
                }
            })?;
            schemas.insert(doc_type, compiled);
        }

        Ok(Self { schemas })
    }

    pub fn doc_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.schemas.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn has_doc_type(&self, doc_type: &str) -> bool {
        self.schemas.contains_key(doc_type)
    }

    /// Validates `frontmatter` against the schema registered for `doc_type`.
    /// An unregistered `doc_type` is accepted without validation: schemas are
    /// opt-in metadata, not a closed type system (§9).
    pub fn validate(&self, doc_type: &str, frontmatter: &JsonValue) -> Result<(), Vec<FieldError>> {
        let Some(validator) = self.schemas.get(doc_type) else {
            return Ok(());
        };

        let errors: Vec<FieldError> = validator
            .iter_errors(frontmatter)
            .map(|err| FieldError {
                field: err.instance_path.to_string(),
                message: err.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn doc_type_from_filename(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    stem.strip_suffix(".schema").unwrap_or(stem).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_schema(dir: &Path, doc_type: &str, schema: &str) {
        let path = dir.join(format!("{doc_type}.json"));
        let mut file = fs::File::create(path).unwrap();
        file.write_all(schema.as_bytes()).unwrap();
    }

    #[test]
    fn missing_directory_yields_empty_registry() {
        let registry = SchemaRegistry::load_from_dir(Path::new("/nonexistent/doc-types")).unwrap();
        assert!(registry.doc_types().is_empty());
    }

    #[test]
    fn valid_frontmatter_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "problem",
            r#"{"type":"object","required":["severity"],"properties":{"severity":{"type":"string"}}}"#,
        );
        let registry = SchemaRegistry::load_from_dir(dir.path()).unwrap();
        assert!(registry.has_doc_type("problem"));

        let value = serde_json::json!({"severity": "high"});
        assert!(registry.validate("problem", &value).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "problem",
            r#"{"type":"object","required":["severity"],"properties":{"severity":{"type":"string"}}}"#,
        );
        let registry = SchemaRegistry::load_from_dir(dir.path()).unwrap();

        let value = serde_json::json!({});
        let errors = registry.validate("problem", &value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn unregistered_doc_type_is_accepted_without_validation() {
        let registry = SchemaRegistry::empty();
        let value = serde_json::json!({"anything": true});
        assert!(registry.validate("unregistered", &value).is_ok());
    }
}

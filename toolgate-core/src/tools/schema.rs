//! JSON Schema validation for tool input and output

use jsonschema::{Draft, Validator};
use serde_json::Value;

/// Compile a schema document
///
/// Schemas must be JSON objects; they are interpreted as draft 2020-12.
pub fn compile(schema: &Value) -> std::result::Result<Validator, String> {
    if !schema.is_object() {
        return Err("schema must be a JSON object".to_string());
    }
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| err.to_string())
}

/// Validate `instance` against `schema`, collecting every violation
///
/// Compiles the schema on each call; contracts keep their compiled
/// validators and go through [`check`] instead.
pub fn validate(schema: &Value, instance: &Value) -> std::result::Result<(), Vec<String>> {
    let validator = compile(schema).map_err(|err| vec![format!("invalid schema: {err}")])?;
    check(&validator, instance)
}

/// Validate `instance` with an already compiled validator
pub fn check(validator: &Validator, instance: &Value) -> std::result::Result<(), Vec<String>> {
    let violations: Vec<String> = validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["add", "subtract"]},
                "a": {"type": "number"}
            },
            "required": ["operation", "a"]
        })
    }

    #[test]
    fn test_accepts_valid_instance() {
        assert!(validate(&schema(), &json!({"operation": "add", "a": 1})).is_ok());
    }

    #[test]
    fn test_reports_missing_required() {
        let violations = validate(&schema(), &json!({"operation": "add"})).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("\"a\""));
    }

    #[test]
    fn test_reports_type_and_enum_violations() {
        let violations =
            validate(&schema(), &json!({"operation": "divide", "a": "x"})).unwrap_err();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_rejects_non_object_schema() {
        assert!(compile(&json!(true)).is_err());
        assert!(compile(&json!({"type": "object"})).is_ok());
    }
}

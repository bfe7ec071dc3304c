//! Tests for the tool data model working together

use super::*;
use serde_json::json;

fn calculator_contract() -> ToolContract {
    ToolContract::builder("calculator", "Basic arithmetic")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["add", "subtract", "multiply", "divide"]},
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["operation", "a", "b"]
        }))
        .output_schema(json!({"type": "number"}))
        .build()
        .unwrap()
}

#[test]
fn test_call_arguments_validate_against_contract() {
    let contract = calculator_contract();

    let good = ToolCall::new("calculator")
        .with_arg("operation", "add")
        .with_arg("a", 2)
        .with_arg("b", 3);
    assert!(schema::validate(contract.input_schema(), &good.arguments_value()).is_ok());

    let missing = ToolCall::new("calculator")
        .with_arg("operation", "add")
        .with_arg("b", 3);
    let violations = schema::validate(contract.input_schema(), &missing.arguments_value())
        .unwrap_err();
    let error = ToolError::input_invalid(violations);
    assert_eq!(error.kind, ErrorKind::ToolInputInvalid);
    assert_eq!(error.source, ErrorSource::Tool);
    assert_eq!(ToolResult::failure(error).status, ToolStatus::InvalidInput);
}

#[test]
fn test_output_schema_check() {
    let contract = calculator_contract();
    let schema = contract.output_schema().unwrap();
    assert!(schema::validate(schema, &json!(5)).is_ok());
    assert!(schema::validate(schema, &json!("five")).is_err());
}

#[test]
fn test_contract_travels_as_dict_inside_json() {
    let contract = calculator_contract();
    let envelope = json!({"tools": [contract.to_dict()]});
    let restored = ToolContract::from_dict(&envelope["tools"][0]).unwrap();
    assert_eq!(restored, contract);
}

#[test]
fn test_call_round_trips_with_trace() {
    let call = ToolCall::new("calculator")
        .with_run_id("run-7")
        .with_trace(TraceContext::new("trace-1", "span-2").with_parent("span-1"))
        .with_scopes(["math"]);
    let text = serde_json::to_string(&call).unwrap();
    let back: ToolCall = serde_json::from_str(&text).unwrap();
    assert_eq!(back, call);
}

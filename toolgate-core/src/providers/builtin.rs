//! Builtin native tools
//!
//! `calculator` and `file_read` are small, dependency-free tools useful for
//! wiring up a gateway and for exercising its policy guards.

use super::{NativeTool, ProviderContext, ProviderError, ProviderOutput};
use crate::error::Result;
use crate::tools::ToolContract;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub const CALCULATOR: &str = "calculator";
pub const FILE_READ: &str = "file_read";

/// Four-function arithmetic
#[derive(Debug, Clone)]
pub struct Calculator {
    contract: ToolContract,
}

impl Calculator {
    pub fn new() -> Result<Self> {
        let contract = ToolContract::builder(CALCULATOR, "Add, subtract, multiply or divide two numbers")
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["add", "subtract", "multiply", "divide"]
                    },
                    "a": {"type": "number"},
                    "b": {"type": "number"}
                },
                "required": ["operation", "a", "b"]
            }))
            .output_schema(json!({"type": "number"}))
            .build()?;
        Ok(Self { contract })
    }
}

/// Integer arithmetic when both operands are integers and the result is exact,
/// floating point otherwise
fn compute(operation: &str, a: &Value, b: &Value) -> std::result::Result<Value, ProviderError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match operation {
            "add" => x.checked_add(y),
            "subtract" => x.checked_sub(y),
            "multiply" => x.checked_mul(y),
            "divide" if y == 0 => return Err(ProviderError::Execution("division by zero".into())),
            "divide" if x.checked_rem(y) == Some(0) => x.checked_div(y),
            _ => None,
        };
        if let Some(value) = exact {
            return Ok(json!(value));
        }
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(ProviderError::InvalidArguments(
            "operands a and b must be numbers".into(),
        ));
    };
    let value = match operation {
        "add" => x + y,
        "subtract" => x - y,
        "multiply" => x * y,
        "divide" if y == 0.0 => return Err(ProviderError::Execution("division by zero".into())),
        "divide" => x / y,
        other => {
            return Err(ProviderError::InvalidArguments(format!(
                "unknown operation '{other}'"
            )));
        }
    };
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ProviderError::Execution("result is not a finite number".into()))
}

#[async_trait]
impl NativeTool for Calculator {
    fn contract(&self) -> &ToolContract {
        &self.contract
    }

    async fn call(
        &self,
        _ctx: &ProviderContext,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let operation = args
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidArguments("operation is required".into()))?;
        let a = args.get("a").unwrap_or(&Value::Null);
        let b = args.get("b").unwrap_or(&Value::Null);
        compute(operation, a, b).map(ProviderOutput::Value)
    }
}

/// Reads a UTF-8 text file
///
/// Declares file access and the roots it may read from, so the gateway's
/// path guard confines `path` to those roots.
#[derive(Debug, Clone)]
pub struct FileRead {
    contract: ToolContract,
}

impl FileRead {
    pub fn new<I, S>(read_paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = ToolContract::builder(FILE_READ, "Read a UTF-8 text file")
            .requires_file_access()
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"}
                },
                "required": ["path"]
            }))
            .output_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "bytes": {"type": "integer"}
                },
                "required": ["path", "content"]
            }));
        for root in read_paths {
            builder = builder.read_path(root);
        }
        Ok(Self {
            contract: builder.build()?,
        })
    }
}

#[async_trait]
impl NativeTool for FileRead {
    fn contract(&self) -> &ToolContract {
        &self.contract
    }

    async fn call(
        &self,
        _ctx: &ProviderContext,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidArguments("path is required".into()))?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::Execution(format!("failed to read {path}: {e}")))?;
        Ok(ProviderOutput::Value(json!({
            "path": path,
            "bytes": content.len(),
            "content": content,
        })))
    }
}

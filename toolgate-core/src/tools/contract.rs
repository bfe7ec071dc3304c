//! Tool contracts
//!
//! A [`ToolContract`] is the immutable description of a tool: what it does,
//! how risky it is, the shape of its input and output, and the policy
//! declarations the gateway enforces before dispatching to it. Contracts
//! validate themselves when built, so an invalid declaration is rejected at
//! registration time and never at call time.

use crate::error::{GatewayError, Result};
use crate::tools::schema;
use serde::{Deserialize, Serialize};
use jsonschema::Validator;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default contract version when none is declared
pub const DEFAULT_CONTRACT_VERSION: &str = "1.0.0";

/// Risk tier of a tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Observes state only
    #[default]
    Read,
    /// Mutates state
    Write,
    /// Administrative operations
    Admin,
}

impl RiskTier {
    /// Whether this tier can mutate state
    pub fn is_mutating(&self) -> bool {
        matches!(self, RiskTier::Write | RiskTier::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Read => "read",
            RiskTier::Write => "write",
            RiskTier::Admin => "admin",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idempotency declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idempotency {
    /// Callers must supply an idempotency key
    #[serde(default)]
    pub required: bool,

    /// Argument carrying the idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
}

/// Sensitivity of the data a tool handles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHandling {
    #[serde(default)]
    pub pii: bool,
    #[serde(default)]
    pub secrets: bool,
}

/// Execution constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub requires_network: bool,
    #[serde(default)]
    pub requires_file_access: bool,
    #[serde(default)]
    pub requires_write: bool,

    /// Upper bound on a single execution, 0 when unset
    #[serde(default)]
    pub max_runtime_ms: u64,
}

impl Constraints {
    /// Declared runtime bound, if any
    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_ms > 0).then(|| Duration::from_millis(self.max_runtime_ms))
    }
}

/// Filesystem roots a tool may touch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read_paths: Vec<String>,
    #[serde(default)]
    pub write_paths: Vec<String>,
}

impl Permissions {
    pub fn is_empty(&self) -> bool {
        self.read_paths.is_empty() && self.write_paths.is_empty()
    }
}

fn default_version() -> String {
    DEFAULT_CONTRACT_VERSION.to_string()
}

fn default_input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

/// Raw contract fields, before validation
///
/// This is the dict form contracts travel in across provider boundaries.
/// Turn it into a [`ToolContract`] with [`ToolContract::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub name: String,
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub risk: RiskTier,

    #[serde(default = "default_input_schema")]
    pub input_schema: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    #[serde(default)]
    pub required_scopes: Vec<String>,

    #[serde(default)]
    pub idempotency: Idempotency,

    #[serde(default)]
    pub data_handling: DataHandling,

    #[serde(default)]
    pub constraints: Constraints,

    #[serde(default)]
    pub permissions: Permissions,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ContractSpec {
    /// Fields with defaults for everything but name and description
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: default_version(),
            risk: RiskTier::default(),
            input_schema: default_input_schema(),
            output_schema: None,
            required_scopes: Vec::new(),
            idempotency: Idempotency::default(),
            data_handling: DataHandling::default(),
            constraints: Constraints::default(),
            permissions: Permissions::default(),
            metadata: Map::new(),
        }
    }

    fn validate(&self) -> Result<CompiledSchemas> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::invalid_contract("name must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(GatewayError::invalid_contract(format!(
                "{}: description must not be empty",
                self.name
            )));
        }
        if let Err(e) = semver::Version::parse(&self.version) {
            return Err(GatewayError::invalid_contract(format!(
                "{}: version '{}' is not semver: {}",
                self.name, self.version, e
            )));
        }
        if self.risk.is_mutating() && !self.idempotency.required {
            return Err(GatewayError::invalid_contract(format!(
                "{}: {} risk requires idempotency.required",
                self.name, self.risk
            )));
        }
        if let Some(field) = &self.idempotency.key_field
            && field.trim().is_empty()
        {
            return Err(GatewayError::invalid_contract(format!(
                "{}: idempotency.key_field must not be empty",
                self.name
            )));
        }

        let input = schema::compile(&self.input_schema).map_err(|e| {
            GatewayError::invalid_contract(format!("{}: input_schema: {}", self.name, e))
        })?;
        let output = match &self.output_schema {
            Some(output) => Some(schema::compile(output).map_err(|e| {
                GatewayError::invalid_contract(format!("{}: output_schema: {}", self.name, e))
            })?),
            None => None,
        };
        Ok(CompiledSchemas { input, output })
    }
}

/// Validators built once when the contract is validated
struct CompiledSchemas {
    input: Validator,
    output: Option<Validator>,
}

/// Validated, immutable tool contract
///
/// Serializes to and deserializes from its dict form; deserialization runs the
/// same validation as [`ToolContract::new`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ContractSpec", into = "ContractSpec")]
pub struct ToolContract {
    spec: ContractSpec,
    schemas: Arc<CompiledSchemas>,
}

impl std::fmt::Debug for ToolContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContract").field("spec", &self.spec).finish()
    }
}

impl PartialEq for ToolContract {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl ToolContract {
    /// Validate the fields and build a contract
    pub fn new(spec: ContractSpec) -> Result<Self> {
        let schemas = spec.validate()?;
        Ok(Self {
            spec,
            schemas: Arc::new(schemas),
        })
    }

    /// Start building a contract
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            spec: ContractSpec::new(name, description),
        }
    }

    /// JSON object form
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(&self.spec).unwrap_or_default()
    }

    /// Parse and validate the JSON object form
    pub fn from_dict(value: &Value) -> Result<Self> {
        let spec: ContractSpec = serde_json::from_value(value.clone())
            .map_err(|e| GatewayError::invalid_contract(e.to_string()))?;
        Self::new(spec)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    pub fn version(&self) -> &str {
        &self.spec.version
    }

    pub fn risk(&self) -> RiskTier {
        self.spec.risk
    }

    pub fn input_schema(&self) -> &Value {
        &self.spec.input_schema
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.spec.output_schema.as_ref()
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.spec.required_scopes
    }

    pub fn idempotency(&self) -> &Idempotency {
        &self.spec.idempotency
    }

    pub fn data_handling(&self) -> DataHandling {
        self.spec.data_handling
    }

    pub fn constraints(&self) -> &Constraints {
        &self.spec.constraints
    }

    pub fn permissions(&self) -> &Permissions {
        &self.spec.permissions
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.spec.metadata
    }

    /// Check call arguments against the input schema
    pub fn validate_input(&self, arguments: &Value) -> std::result::Result<(), Vec<String>> {
        schema::check(&self.schemas.input, arguments)
    }

    /// Check a tool's output; always passes when no output schema is declared
    pub fn validate_output(&self, output: &Value) -> std::result::Result<(), Vec<String>> {
        match &self.schemas.output {
            Some(validator) => schema::check(validator, output),
            None => Ok(()),
        }
    }

    /// Whether the tool can change state, by tier or by declaration
    pub fn is_mutating(&self) -> bool {
        self.spec.risk.is_mutating() || self.spec.constraints.requires_write
    }

    /// Raw fields
    pub fn spec(&self) -> &ContractSpec {
        &self.spec
    }
}

impl TryFrom<ContractSpec> for ToolContract {
    type Error = GatewayError;

    fn try_from(spec: ContractSpec) -> Result<Self> {
        Self::new(spec)
    }
}

impl From<ToolContract> for ContractSpec {
    fn from(contract: ToolContract) -> Self {
        contract.spec
    }
}

/// Builder for [`ToolContract`]
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    spec: ContractSpec,
}

impl ContractBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.spec.version = version.into();
        self
    }

    pub fn risk(mut self, risk: RiskTier) -> Self {
        self.spec.risk = risk;
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.spec.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.spec.output_schema = Some(schema);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.spec.required_scopes.push(scope.into());
        self
    }

    /// Mark the tool idempotent, optionally naming the key argument
    pub fn idempotent(mut self, key_field: Option<&str>) -> Self {
        self.spec.idempotency = Idempotency {
            required: true,
            key_field: key_field.map(str::to_string),
        };
        self
    }

    pub fn pii(mut self) -> Self {
        self.spec.data_handling.pii = true;
        self
    }

    pub fn secrets(mut self) -> Self {
        self.spec.data_handling.secrets = true;
        self
    }

    pub fn requires_network(mut self) -> Self {
        self.spec.constraints.requires_network = true;
        self
    }

    pub fn requires_file_access(mut self) -> Self {
        self.spec.constraints.requires_file_access = true;
        self
    }

    pub fn requires_write(mut self) -> Self {
        self.spec.constraints.requires_write = true;
        self
    }

    pub fn max_runtime(mut self, limit: Duration) -> Self {
        self.spec.constraints.max_runtime_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn read_path(mut self, root: impl Into<String>) -> Self {
        self.spec.permissions.read_paths.push(root.into());
        self
    }

    pub fn write_path(mut self, root: impl Into<String>) -> Self {
        self.spec.permissions.write_paths.push(root.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.spec.metadata.insert(key.into(), value);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ToolContract> {
        ToolContract::new(self.spec)
    }
}

//! Deterministic fixture replay and recording
//!
//! Fixtures map `(tool_name, tool_version, sha256(canonical_json(args)))` to
//! a canned result, so an agent run can be replayed offline with identical
//! tool behaviour. [`RecordingProvider`] produces fixture sets from a live
//! provider; [`FixtureProvider`] replays them.

use super::{Provider, ProviderContext, ProviderError, ProviderOutput};
use crate::error::{GatewayError, Result};
use crate::tools::{ToolContract, ToolError, ToolResult, ToolStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Current schema version for fixture files
pub const FIXTURE_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    FIXTURE_SCHEMA_VERSION
}

/// Compact JSON with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}

/// Hex SHA-256 of the canonical form of `args`
pub fn args_sha256(args: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical_object(args, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lookup key of a fixture entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixtureKey {
    pub tool_name: String,
    pub tool_version: String,
    pub args_sha256: String,
}

impl FixtureKey {
    pub fn new(
        tool_name: impl Into<String>,
        tool_version: impl Into<String>,
        args: &Map<String, Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_version: tool_version.into(),
            args_sha256: args_sha256(args),
        }
    }
}

/// One recorded outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntry {
    pub tool_name: String,
    pub tool_version: String,
    pub args_sha256: String,

    /// Original arguments, kept for readability of fixture files
    #[serde(default)]
    pub arguments: Map<String, Value>,

    pub status: ToolStatus,

    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,

    /// Simulated latency on replay
    #[serde(default)]
    pub delay_ms: u64,
}

impl FixtureEntry {
    /// Successful entry for `contract` called with `args`
    pub fn success(contract: &ToolContract, args: Map<String, Value>, output: Value) -> Self {
        Self::from_result(contract, args, ToolResult::success(output))
    }

    /// Entry replaying `result`
    pub fn from_result(contract: &ToolContract, args: Map<String, Value>, result: ToolResult) -> Self {
        Self {
            tool_name: contract.name().to_string(),
            tool_version: contract.version().to_string(),
            args_sha256: args_sha256(&args),
            arguments: args,
            status: result.status,
            output: result.output,
            error: result.error,
            delay_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn key(&self) -> FixtureKey {
        FixtureKey {
            tool_name: self.tool_name.clone(),
            tool_version: self.tool_version.clone(),
            args_sha256: self.args_sha256.clone(),
        }
    }

    /// Result this entry replays as
    pub fn to_result(&self) -> ToolResult {
        if self.status == ToolStatus::Success {
            return ToolResult::success(self.output.clone());
        }
        let error = self
            .error
            .clone()
            .unwrap_or_else(|| ToolError::provider("recorded failure"));
        let mut result = ToolResult::failure(error);
        result.status = self.status;
        result.output = self.output.clone();
        result
    }
}

/// A replayable set of contracts and recorded outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub contracts: Vec<ToolContract>,

    #[serde(default)]
    pub entries: Vec<FixtureEntry>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self {
            schema_version: FIXTURE_SCHEMA_VERSION,
            contracts: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Add or replace the contract with the same name
    pub fn add_contract(&mut self, contract: ToolContract) {
        match self.contracts.iter_mut().find(|c| c.name() == contract.name()) {
            Some(existing) => *existing = contract,
            None => self.contracts.push(contract),
        }
    }

    pub fn with_contract(mut self, contract: ToolContract) -> Self {
        self.add_contract(contract);
        self
    }

    /// Add or replace the entry with the same key
    pub fn record(&mut self, entry: FixtureEntry) {
        let key = entry.key();
        match self.entries.iter_mut().find(|e| e.key() == key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn with_entry(mut self, entry: FixtureEntry) -> Self {
        self.record(entry);
        self
    }

    pub fn lookup(&self, key: &FixtureKey) -> Option<&FixtureEntry> {
        self.entries.iter().find(|e| &e.key() == key)
    }

    /// Load a fixture set from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let set: FixtureSet = serde_json::from_str(&content)
            .map_err(|e| GatewayError::Fixture(format!("{}: {}", path.display(), e)))?;
        if set.schema_version > FIXTURE_SCHEMA_VERSION {
            return Err(GatewayError::Fixture(format!(
                "{}: unsupported schema version {}",
                path.display(),
                set.schema_version
            )));
        }
        Ok(set)
    }

    /// Save the fixture set to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Replays a [`FixtureSet`]
pub struct FixtureProvider {
    id: String,
    contracts: Vec<ToolContract>,
    entries: HashMap<FixtureKey, FixtureEntry>,
    call_count: AtomicUsize,
}

impl FixtureProvider {
    pub fn new(id: impl Into<String>, set: FixtureSet) -> Self {
        let entries = set.entries.into_iter().map(|e| (e.key(), e)).collect();
        Self {
            id: id.into(),
            contracts: set.contracts,
            entries,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn from_file(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(id, FixtureSet::load(path)?))
    }

    /// Number of executions served, hits and misses alike
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FixtureProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(
        &self,
        _ctx: &ProviderContext,
    ) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        Ok(self.contracts.clone())
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let contract = self
            .contracts
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| ProviderError::ToolNotFound(name.to_string()))?;
        let key = FixtureKey::new(name, contract.version(), &args);
        let Some(entry) = self.entries.get(&key) else {
            return Err(ProviderError::FixtureNotFound {
                tool: key.tool_name,
                version: key.tool_version,
                args_sha256: key.args_sha256,
            });
        };

        if entry.delay_ms > 0 {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(entry.delay_ms)) => {}
            }
        }

        Ok(ProviderOutput::Result(entry.to_result()))
    }
}

/// Forwards to another provider and records every completed execution
pub struct RecordingProvider {
    id: String,
    inner: Arc<dyn Provider>,
    set: Mutex<FixtureSet>,
}

impl RecordingProvider {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            id: format!("recording:{}", inner.id()),
            inner,
            set: Mutex::new(FixtureSet::new()),
        }
    }

    /// Everything recorded so far
    pub fn snapshot(&self) -> FixtureSet {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.snapshot().save(path)
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(
        &self,
        ctx: &ProviderContext,
    ) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        let contracts = self.inner.list_tools(ctx).await?;
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        for contract in &contracts {
            set.add_contract(contract.clone());
        }
        Ok(contracts)
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let output = self.inner.execute(ctx, name, args.clone()).await?;

        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(contract) = set.contracts.iter().find(|c| c.name() == name).cloned() else {
            tracing::debug!(provider = %self.id, tool = %name, "Not recording call to unlisted tool");
            return Ok(output);
        };
        set.record(FixtureEntry::from_result(
            &contract,
            args,
            output.clone().into_result(),
        ));
        Ok(output)
    }
}

//! Policy guards run before dispatch
//!
//! Each guard returns the [`ToolError`] that blocks the call. The gateway runs
//! them in a fixed order and stops at the first failure.

use crate::tools::{ToolCall, ToolContract, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Argument names treated as filesystem paths, besides any `*_path` key
const PATH_KEYS: &[&str] = &["path", "file", "file_path", "filename", "dir", "directory"];

/// Record of one guard's verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// What was checked
    pub check: String,

    /// Whether it was allowed
    pub allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn new(check: impl Into<String>, allowed: bool) -> Self {
        Self {
            check: check.into(),
            allowed,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Per-key call counters
#[derive(Debug)]
struct BudgetLedger {
    max_tool_calls: u64,
    counters: Mutex<HashMap<String, u64>>,
}

impl BudgetLedger {
    fn used(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

/// The gateway's guards and their state
#[derive(Debug)]
pub struct PolicyPipeline {
    allowlist: HashSet<String>,
    read_only: bool,
    budget: BudgetLedger,
}

impl PolicyPipeline {
    pub fn new<I, S>(allowlist: I, read_only: bool, max_tool_calls: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowlist: allowlist.into_iter().map(Into::into).collect(),
            read_only,
            budget: BudgetLedger {
                max_tool_calls,
                counters: Mutex::new(HashMap::new()),
            },
        }
    }

    pub fn is_allowlisted(&self, tool_name: &str) -> bool {
        self.allowlist.contains(tool_name)
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn max_tool_calls(&self) -> u64 {
        self.budget.max_tool_calls
    }

    /// Calls admitted so far under `key`
    pub fn budget_used(&self, key: &str) -> u64 {
        self.budget.used(key)
    }

    pub fn check_allowlist(&self, tool_name: &str) -> Result<(), ToolError> {
        if self.is_allowlisted(tool_name) {
            Ok(())
        } else {
            Err(ToolError::policy(format!("tool '{tool_name}' is not allowlisted")))
        }
    }

    /// Fail when `key` has no calls left; nothing is counted
    pub fn check_budget(&self, key: &str) -> Result<(), ToolError> {
        let limit = self.budget.max_tool_calls;
        if limit > 0 && self.budget.used(key) >= limit {
            return Err(ToolError::budget_exceeded(key, limit));
        }
        Ok(())
    }

    /// Count one call against `key`, checking the limit under the same lock
    ///
    /// Called once every other guard has passed. A concurrent call may have
    /// taken the last slot since [`check_budget`](Self::check_budget).
    pub fn consume_budget(&self, key: &str) -> Result<(), ToolError> {
        let limit = self.budget.max_tool_calls;
        if limit == 0 {
            return Ok(());
        }

        let mut counters = self
            .budget
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let used = counters.entry(key.to_string()).or_insert(0);
        if *used >= limit {
            return Err(ToolError::budget_exceeded(key, limit));
        }
        *used += 1;
        Ok(())
    }

    pub fn check_risk(&self, contract: &ToolContract) -> Result<(), ToolError> {
        if self.read_only && contract.is_mutating() {
            return Err(ToolError::policy(format!(
                "tool '{}' can mutate state ({} risk) and the gateway is read-only",
                contract.name(),
                contract.risk()
            )));
        }
        Ok(())
    }

    pub fn check_scopes(&self, contract: &ToolContract, call: &ToolCall) -> Result<(), ToolError> {
        if call.grants(contract.required_scopes()) {
            return Ok(());
        }
        let granted = call.scopes.as_deref().unwrap_or_default();
        let missing: Vec<&String> = contract
            .required_scopes()
            .iter()
            .filter(|scope| !granted.contains(scope))
            .collect();
        Err(ToolError::policy(format!(
            "missing required scopes: {}",
            missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ))
        .with_details(json!({ "missing_scopes": missing })))
    }

    /// Confine path-shaped arguments to the contract's declared roots
    pub async fn check_paths(
        &self,
        contract: &ToolContract,
        args: &Map<String, Value>,
    ) -> Result<(), ToolError> {
        let constraints = contract.constraints();
        let permissions = contract.permissions();
        if !constraints.requires_file_access && permissions.is_empty() {
            return Ok(());
        }
        let candidates = path_arguments(args);
        if candidates.is_empty() {
            return Ok(());
        }

        let mut declared: Vec<&String> = permissions.read_paths.iter().collect();
        if constraints.requires_write {
            declared.extend(permissions.write_paths.iter());
        }
        let mut roots = Vec::with_capacity(declared.len());
        for root in &declared {
            roots.push(resolve_path(Path::new(root.as_str())).await);
        }

        for (key, raw) in candidates {
            let resolved = resolve_path(Path::new(raw)).await;
            if !roots.iter().any(|root| resolved.starts_with(root)) {
                return Err(ToolError::policy(format!(
                    "argument '{key}' path '{raw}' is outside the permitted roots"
                ))
                .with_details(json!({
                    "argument": key,
                    "path": raw,
                    "resolved": resolved.display().to_string(),
                    "permitted_roots": declared,
                })));
            }
        }
        Ok(())
    }

    pub fn check_input(
        &self,
        contract: &ToolContract,
        args: &Map<String, Value>,
    ) -> Result<(), ToolError> {
        contract
            .validate_input(&Value::Object(args.clone()))
            .map_err(ToolError::input_invalid)
    }
}

fn is_path_key(key: &str) -> bool {
    PATH_KEYS.contains(&key) || key.ends_with("_path")
}

/// `(key, value)` for every path-shaped string argument
fn path_arguments(args: &Map<String, Value>) -> Vec<(&str, &str)> {
    let mut found = Vec::new();
    for (key, value) in args {
        if !is_path_key(key) {
            continue;
        }
        match value {
            Value::String(path) => found.push((key.as_str(), path.as_str())),
            Value::Array(items) => found.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|path| (key.as_str(), path)),
            ),
            _ => {}
        }
    }
    found
}

/// Absolute form of `path` with symlinks resolved
///
/// Components are applied one at a time and each existing prefix is
/// canonicalized before the next one, so a `..` after a symlink climbs out of
/// the link's target exactly as the OS would. Components past the last
/// existing directory are folded lexically.
async fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => {
                out.push(part);
                if let Ok(canonical) = tokio::fs::canonicalize(&out).await {
                    out = canonical;
                }
            }
        }
    }
    out
}

use super::*;
use crate::providers::{
    FixtureEntry, FixtureProvider, FixtureSet, FnTool, NativeProvider, NativeTool, ProviderContext,
    ProviderError, ProviderOutput,
    builtin::{Calculator, FileRead},
};
use crate::tools::{ErrorKind, ErrorSource, RiskTier, ToolStatus};
use async_trait::async_trait;
use serde_json::{Map, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Wraps a provider and counts executions
struct Counting {
    inner: Arc<dyn Provider>,
    executions: AtomicUsize,
}

impl Counting {
    fn new(inner: impl Provider + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            executions: AtomicUsize::new(0),
        })
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for Counting {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn list_tools(&self, ctx: &ProviderContext) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        self.inner.list_tools(ctx).await
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(ctx, name, args).await
    }
}

/// Wraps a provider and delays tool listing
struct SlowListing {
    inner: Arc<dyn Provider>,
    delay: Duration,
}

#[async_trait]
impl Provider for SlowListing {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn list_tools(&self, ctx: &ProviderContext) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_tools(ctx).await
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        self.inner.execute(ctx, name, args).await
    }
}

fn calculator() -> Arc<Counting> {
    Counting::new(
        NativeProvider::new("native")
            .with_tool(Calculator::new().unwrap())
            .unwrap(),
    )
}

fn add(a: i64, b: i64) -> ToolCall {
    ToolCall::new("calculator")
        .with_arg("operation", "add")
        .with_arg("a", a)
        .with_arg("b", b)
}

fn gateway(provider: Arc<Counting>) -> (Gateway, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .allow("calculator")
        .provider(provider)
        .audit_sink(sink.clone())
        .build()
        .unwrap();
    (gateway, sink)
}

fn single_tool(contract: ToolContract, output: Value) -> Arc<Counting> {
    let tool = FnTool::sync(contract, move |_| Ok(output.clone()));
    Counting::new(NativeProvider::new("native").with_tool(tool).unwrap())
}

#[tokio::test]
async fn test_success_is_stamped_and_audited() {
    let provider = calculator();
    let (gateway, sink) = gateway(provider.clone());

    let call = add(2, 3).with_id("call-1").with_run_id("run-1");
    let result = gateway.execute(call).await;

    assert!(result.is_success());
    assert_eq!(result.output, json!(5));
    assert_eq!(result.tool_call_id, "call-1");
    assert_eq!(result.tool_name, "calculator");
    assert_eq!(result.metadata["tool_version"], "1.0.0");
    assert_eq!(provider.executions(), 1);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, AuditEventType::Started);
    assert_eq!(events[1].event_type, AuditEventType::Finished);
    assert_eq!(events[1].attrs.status, Some(ToolStatus::Success));
    assert_eq!(events[1].run_id.as_deref(), Some("run-1"));
}

#[tokio::test]
async fn test_policy_decisions_recorded() {
    let (gateway, _) = gateway(calculator());
    let result = gateway.execute(add(1, 1)).await;
    let decisions: Vec<PolicyDecision> =
        serde_json::from_value(result.metadata[POLICY_DECISIONS_KEY].clone()).unwrap();
    let checks: Vec<&str> = decisions.iter().map(|d| d.check.as_str()).collect();
    assert_eq!(
        checks,
        vec!["allowlist", "budget", "resolve", "risk", "scopes", "paths", "input"]
    );
    assert!(decisions.iter().all(|d| d.allowed));
}

#[tokio::test]
async fn test_blank_call_id_is_generated() {
    let (gateway, _) = gateway(calculator());
    let result = gateway.execute(add(1, 1).with_id("")).await;
    assert!(!result.tool_call_id.is_empty());
}

#[tokio::test]
async fn test_not_allowlisted_never_reaches_provider() {
    let provider = calculator();
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .provider(provider.clone())
        .audit_sink(sink.clone())
        .build()
        .unwrap();

    let result = gateway.execute(add(2, 3)).await;
    assert_eq!(result.status, ToolStatus::Failure);
    let error = result.get_error().unwrap();
    assert_eq!(error.kind, ErrorKind::PolicyViolation);
    assert_eq!(error.source, ErrorSource::Policy);
    assert_eq!(provider.executions(), 0);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AuditEventType::Blocked);
    assert_eq!(events[0].severity, Severity::Warn);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .allow("missing")
        .provider(calculator())
        .audit_sink(sink.clone())
        .max_tool_calls(5)
        .build()
        .unwrap();

    let result = gateway.execute(ToolCall::new("missing")).await;
    assert_eq!(result.status, ToolStatus::NotFound);
    assert_eq!(result.get_error().unwrap().source, ErrorSource::Tool);
    assert!(!result.metadata.contains_key("tool_version"));
    assert_eq!(gateway.budget_used("default"), 0);
    assert_eq!(sink.of_type(AuditEventType::Blocked).len(), 1);
}

#[tokio::test]
async fn test_budget_exhaustion() {
    let provider = calculator();
    let gateway = Gateway::builder()
        .allow("calculator")
        .max_tool_calls(2)
        .provider(provider.clone())
        .build()
        .unwrap();

    for _ in 0..2 {
        assert!(gateway.execute(add(1, 1).with_run_id("run")).await.is_success());
    }
    let third = gateway.execute(add(1, 1).with_run_id("run")).await;
    assert_eq!(third.error_kind(), Some(ErrorKind::BudgetExceeded));
    assert_eq!(third.get_error().unwrap().source, ErrorSource::Policy);
    assert_eq!(gateway.budget_used("run"), 2);
    assert_eq!(provider.executions(), 2);

    assert!(gateway.execute(add(1, 1).with_run_id("other")).await.is_success());
}

#[tokio::test]
async fn test_blocked_call_does_not_spend_budget() {
    let provider = calculator();
    let gateway = Gateway::builder()
        .allow("calculator")
        .max_tool_calls(1)
        .provider(provider.clone())
        .build()
        .unwrap();

    let invalid = ToolCall::new("calculator").with_arg("operation", "add").with_arg("b", 1);
    let result = gateway.execute(invalid).await;
    assert_eq!(result.status, ToolStatus::InvalidInput);
    assert_eq!(gateway.budget_used("default"), 0);

    assert!(gateway.execute(add(1, 1)).await.is_success());
    assert_eq!(gateway.budget_used("default"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_respect_budget() {
    let gateway = Arc::new(
        Gateway::builder()
            .allow("calculator")
            .max_tool_calls(3)
            .provider(calculator())
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.execute(add(i, 1).with_run_id("run")).await })
        })
        .collect();

    let mut successes = 0;
    let mut exhausted = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        match result.error_kind() {
            None => successes += 1,
            Some(ErrorKind::BudgetExceeded) => exhausted += 1,
            Some(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(successes, 3);
    assert_eq!(exhausted, 7);
    assert_eq!(gateway.budget_used("run"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_call_does_not_deny_concurrent_call() {
    let provider = Arc::new(SlowListing {
        inner: calculator(),
        delay: Duration::from_millis(50),
    });
    let gateway = Arc::new(
        Gateway::builder()
            .allowlist(["calculator", "ghost"])
            .max_tool_calls(1)
            .provider(provider)
            .build()
            .unwrap(),
    );

    let ghost = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.execute(ToolCall::new("ghost").with_run_id("run")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let calc = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.execute(add(1, 1).with_run_id("run")).await })
    };

    let ghost = ghost.await.unwrap();
    let calc = calc.await.unwrap();
    assert_eq!(ghost.status, ToolStatus::NotFound);
    assert!(calc.is_success(), "{:?}", calc.error);
    assert_eq!(gateway.budget_used("run"), 1);
}

#[tokio::test]
async fn test_read_only_blocks_write_tools() {
    let contract = ToolContract::builder("db_write", "Write a row")
        .risk(RiskTier::Write)
        .idempotent(Some("request_id"))
        .build()
        .unwrap();
    let provider = single_tool(contract, json!({"ok": true}));
    let gateway = Gateway::builder()
        .allow("db_write")
        .read_only(true)
        .provider(provider.clone())
        .build()
        .unwrap();

    let result = gateway.execute(ToolCall::new("db_write")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::PolicyViolation));
    assert_eq!(result.metadata["tool_version"], "1.0.0");
    assert_eq!(provider.executions(), 0);
}

#[tokio::test]
async fn test_missing_scope_is_blocked() {
    let contract = ToolContract::builder("deploy", "Deploy")
        .scope("deploy:prod")
        .build()
        .unwrap();
    let provider = single_tool(contract, json!("deployed"));
    let gateway = Gateway::builder()
        .allow("deploy")
        .provider(provider.clone())
        .build()
        .unwrap();

    let denied = gateway.execute(ToolCall::new("deploy")).await;
    assert_eq!(denied.error_kind(), Some(ErrorKind::PolicyViolation));

    let granted = gateway
        .execute(ToolCall::new("deploy").with_scopes(["deploy:prod"]))
        .await;
    assert!(granted.is_success());
    assert_eq!(provider.executions(), 1);
}

#[tokio::test]
async fn test_file_read_confined_to_roots() {
    let sandbox = tempfile::tempdir().unwrap();
    let inside = sandbox.path().join("notes.txt");
    std::fs::write(&inside, "hello").unwrap();

    let root = sandbox.path().to_string_lossy().to_string();
    let provider = Counting::new(
        NativeProvider::new("native")
            .with_tool(FileRead::new([root]).unwrap())
            .unwrap(),
    );
    let gateway = Gateway::builder()
        .allow("file_read")
        .provider(provider.clone())
        .build()
        .unwrap();

    let ok = gateway
        .execute(ToolCall::new("file_read").with_arg("path", inside.to_string_lossy().to_string()))
        .await;
    assert!(ok.is_success(), "{:?}", ok.error);
    assert_eq!(ok.output["content"], "hello");

    let escape = sandbox.path().join("..").join("..").join("etc").join("passwd");
    let denied = gateway
        .execute(ToolCall::new("file_read").with_arg("path", escape.to_string_lossy().to_string()))
        .await;
    assert_eq!(denied.error_kind(), Some(ErrorKind::PolicyViolation));
    assert_eq!(provider.executions(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_read_cannot_climb_out_of_symlink() {
    let sandbox = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    std::fs::create_dir(outside.path().join("a")).unwrap();
    std::fs::write(outside.path().join("secret.txt"), "TOPSECRET").unwrap();
    std::os::unix::fs::symlink(outside.path().join("a"), sandbox.path().join("link")).unwrap();

    let root = sandbox.path().to_string_lossy().to_string();
    let provider = Counting::new(
        NativeProvider::new("native")
            .with_tool(FileRead::new([root]).unwrap())
            .unwrap(),
    );
    let gateway = Gateway::builder()
        .allow("file_read")
        .provider(provider.clone())
        .build()
        .unwrap();

    let climbed = sandbox.path().join("link").join("..").join("secret.txt");
    let result = gateway
        .execute(ToolCall::new("file_read").with_arg("path", climbed.to_string_lossy().to_string()))
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::PolicyViolation));
    assert_eq!(provider.executions(), 0);
}

#[tokio::test]
async fn test_output_schema_mismatch() {
    let contract = ToolContract::builder("count", "Count things")
        .output_schema(json!({"type": "integer"}))
        .build()
        .unwrap();
    let provider = single_tool(contract, json!("seven"));
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .allow("count")
        .provider(provider)
        .audit_sink(sink.clone())
        .build()
        .unwrap();

    let result = gateway.execute(ToolCall::new("count")).await;
    assert_eq!(result.status, ToolStatus::Failure);
    assert_eq!(result.error_kind(), Some(ErrorKind::ToolResultInvalid));
    assert_eq!(result.tool_name, "count");

    let finished = sink.of_type(AuditEventType::Finished);
    assert_eq!(finished[0].attrs.status, Some(ToolStatus::Failure));
}

#[tokio::test]
async fn test_provider_failure_is_finished_not_blocked() {
    let (gateway, sink) = gateway(calculator());
    let call = ToolCall::new("calculator")
        .with_arg("operation", "divide")
        .with_arg("a", 1)
        .with_arg("b", 0);
    let result = gateway.execute(call).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ToolProviderError));
    assert!(sink.of_type(AuditEventType::Blocked).is_empty());
    let finished = sink.of_type(AuditEventType::Finished);
    assert_eq!(finished[0].severity, Severity::Warn);
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout() {
    let contract = ToolContract::builder("slow", "Sleeps")
        .max_runtime(Duration::from_secs(10))
        .build()
        .unwrap();
    let tool = FnTool::new(contract, |_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!("late"))
    });
    let gateway = Gateway::builder()
        .allow("slow")
        .provider(Arc::new(NativeProvider::new("native").with_tool(tool).unwrap()))
        .build()
        .unwrap();

    let timed_out = gateway
        .execute(ToolCall::new("slow").with_timeout(Duration::from_millis(200)))
        .await;
    assert_eq!(timed_out.status, ToolStatus::Timeout);
    assert!(!timed_out.get_error().unwrap().retryable);
    assert_eq!(timed_out.duration_ms, 200);

    let finished = gateway.execute(ToolCall::new("slow")).await;
    assert!(finished.is_success());
}

#[tokio::test]
async fn test_provider_result_passes_through() {
    let contract = Calculator::new().unwrap().contract().clone();
    let set = FixtureSet::new()
        .with_entry(FixtureEntry::success(&contract, add(2, 3).arguments, json!(5)))
        .with_contract(contract);

    let gateway = Gateway::builder()
        .allow("calculator")
        .provider(Arc::new(FixtureProvider::new("fixtures", set)))
        .build()
        .unwrap();

    let hit = gateway.execute(add(2, 3)).await;
    assert_eq!(hit.output, json!(5));

    let miss = gateway.execute(add(2, 4)).await;
    let error = miss.get_error().unwrap();
    assert_eq!(error.kind, ErrorKind::ToolProviderError);
    assert_eq!(error.details.as_ref().unwrap()["reason"], "fixture_not_found");
}

#[tokio::test]
async fn test_list_tools_filters_and_sorts() {
    let provider = NativeProvider::new("native")
        .with_tool(Calculator::new().unwrap())
        .unwrap()
        .with_tool(FileRead::new(["/sandbox"]).unwrap())
        .unwrap()
        .with_tool(FnTool::sync(
            ToolContract::builder("echo", "Echo").build().unwrap(),
            |args| Ok(Value::Object(args)),
        ))
        .unwrap();
    let gateway = Gateway::builder()
        .allowlist(["file_read", "echo"])
        .provider(Arc::new(provider))
        .build()
        .unwrap();

    let names: Vec<String> = gateway
        .list_tools()
        .await
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["echo", "file_read"]);
}

#[tokio::test]
async fn test_execute_batch_keeps_order() {
    let (gateway, _) = gateway(calculator());
    let results = gateway
        .execute_batch(vec![
            add(1, 1),
            ToolCall::new("shell"),
            add(2, 2),
        ])
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].output, json!(2));
    assert_eq!(results[1].error_kind(), Some(ErrorKind::PolicyViolation));
    assert_eq!(results[2].output, json!(4));
}

#[tokio::test]
async fn test_redacted_audit_keeps_result() {
    let contract = ToolContract::builder("lookup", "Customer lookup")
        .secrets()
        .build()
        .unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .allow("lookup")
        .provider(single_tool(contract, json!({"token": "s3cr3t"})))
        .audit_sink(sink.clone())
        .build()
        .unwrap();

    let result = gateway
        .execute(ToolCall::new("lookup").with_arg("api_key", "k"))
        .await;
    assert_eq!(result.output["token"], "s3cr3t");

    for event in sink.events() {
        assert_eq!(event.attrs.arguments, json!(REDACTED));
    }
    let finished = sink.of_type(AuditEventType::Finished);
    assert_eq!(finished[0].attrs.output, Some(json!(REDACTED)));
}

#[tokio::test]
async fn test_redacted_blocked_event_hides_argument_values() {
    let contract = ToolContract::builder("lookup_person", "Look up a person")
        .pii()
        .input_schema(json!({
            "type": "object",
            "properties": {"ssn": {"type": "integer"}},
            "required": ["ssn"]
        }))
        .build()
        .unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let gateway = Gateway::builder()
        .allow("lookup_person")
        .provider(single_tool(contract, json!({"found": true})))
        .audit_sink(sink.clone())
        .build()
        .unwrap();

    let result = gateway
        .execute(ToolCall::new("lookup_person").with_arg("ssn", "123-45-6789"))
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ToolInputInvalid));

    let blocked = sink.of_type(AuditEventType::Blocked);
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].attrs.arguments, json!(REDACTED));
    let serialized = serde_json::to_string(&blocked[0]).unwrap();
    assert!(!serialized.contains("123-45-6789"), "{serialized}");
}

#[test]
fn test_builder_from_config() {
    let config = GatewayConfig {
        allowlist: vec!["calculator".into()],
        policies: crate::config::PolicyConfig {
            read_only: true,
            budgets: crate::config::BudgetConfig { max_tool_calls: 4 },
        },
        remote: vec![RemoteServerConfig::new("search", "http://127.0.0.1:1/mcp")],
        ..Default::default()
    };
    let gateway = Gateway::builder()
        .with_config(&config)
        .provider(calculator())
        .build()
        .unwrap();

    assert!(gateway.policy().read_only());
    assert_eq!(gateway.policy().max_tool_calls(), 4);
    assert!(gateway.policy().is_allowlisted("calculator"));
    let ids: Vec<&str> = gateway.resolver().providers().iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec!["native", "search"]);
}

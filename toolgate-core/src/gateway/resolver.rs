//! Tool name resolution across providers
//!
//! The index is built lazily: the first lookup that misses lists every
//! provider in registration order and merges what they report. Entries are
//! never replaced, so whichever provider reported a name first owns it until
//! [`Resolver::invalidate`] is called.

use crate::providers::{Provider, ProviderContext};
use crate::tools::ToolContract;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// What to do when two providers expose the same tool name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The first provider in registration order keeps the name
    #[default]
    FirstWins,
    /// The name resolves to nothing
    Reject,
}

/// A resolved tool: its provider and contract
#[derive(Clone)]
pub struct ResolvedTool {
    pub provider: Arc<dyn Provider>,
    pub contract: Arc<ToolContract>,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("provider", &self.provider.id())
            .field("tool", &self.contract.name())
            .finish()
    }
}

#[derive(Clone)]
struct IndexEntry {
    provider_index: usize,
    tool: ResolvedTool,
}

#[derive(Default)]
struct ToolIndex {
    entries: HashMap<String, IndexEntry>,
    conflicted: HashSet<String>,
}

/// Lazily built name → (provider, contract) index
pub struct Resolver {
    providers: Vec<Arc<dyn Provider>>,
    collision: CollisionPolicy,
    index: RwLock<ToolIndex>,
    build_lock: Mutex<()>,
}

impl Resolver {
    pub fn new(providers: Vec<Arc<dyn Provider>>, collision: CollisionPolicy) -> Self {
        Self {
            providers,
            collision,
            index: RwLock::new(ToolIndex::default()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision
    }

    async fn cached(&self, name: &str) -> Option<ResolvedTool> {
        self.index
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| entry.tool.clone())
    }

    /// Resolve a tool name, listing providers on a miss
    pub async fn resolve(&self, name: &str) -> Option<ResolvedTool> {
        if let Some(tool) = self.cached(name).await {
            return Some(tool);
        }

        let _build = self.build_lock.lock().await;
        // Another task may have built the index while we waited.
        if let Some(tool) = self.cached(name).await {
            return Some(tool);
        }
        if self.index.read().await.conflicted.contains(name) {
            return None;
        }

        self.build().await;
        self.cached(name).await
    }

    /// Every resolvable contract, building the index if it is empty
    pub async fn contracts(&self) -> Vec<Arc<ToolContract>> {
        {
            let _build = self.build_lock.lock().await;
            let empty = {
                let index = self.index.read().await;
                index.entries.is_empty() && index.conflicted.is_empty()
            };
            if empty {
                self.build().await;
            }
        }
        self.index
            .read()
            .await
            .entries
            .values()
            .map(|entry| Arc::clone(&entry.tool.contract))
            .collect()
    }

    /// Drop the index; the next lookup lists providers again
    pub async fn invalidate(&self) {
        let _build = self.build_lock.lock().await;
        *self.index.write().await = ToolIndex::default();
        tracing::debug!("Tool index invalidated");
    }

    /// List all providers and merge their contracts. Caller holds `build_lock`.
    async fn build(&self) {
        let ctx = ProviderContext::new();
        let mut listed = Vec::with_capacity(self.providers.len());
        for (provider_index, provider) in self.providers.iter().enumerate() {
            match provider.list_tools(&ctx).await {
                Ok(contracts) => listed.push((provider_index, contracts)),
                Err(e) => {
                    tracing::warn!(provider = %provider.id(), error = %e, "Provider failed to list tools, skipping");
                }
            }
        }

        let mut index = self.index.write().await;
        for (provider_index, contracts) in listed {
            let provider = &self.providers[provider_index];
            for contract in contracts {
                self.merge(&mut index, provider_index, provider, contract);
            }
        }
        tracing::debug!(
            tools = index.entries.len(),
            conflicted = index.conflicted.len(),
            "Tool index built"
        );
    }

    fn merge(
        &self,
        index: &mut ToolIndex,
        provider_index: usize,
        provider: &Arc<dyn Provider>,
        contract: ToolContract,
    ) {
        let name = contract.name().to_string();
        if index.conflicted.contains(&name) {
            return;
        }
        let Some(existing) = index.entries.get(&name) else {
            index.entries.insert(
                name,
                IndexEntry {
                    provider_index,
                    tool: ResolvedTool {
                        provider: Arc::clone(provider),
                        contract: Arc::new(contract),
                    },
                },
            );
            return;
        };
        if existing.provider_index == provider_index {
            return;
        }

        let owner = existing.tool.provider.id().to_string();
        match self.collision {
            CollisionPolicy::FirstWins => {
                tracing::warn!(
                    tool = %name,
                    owner = %owner,
                    ignored = %provider.id(),
                    "Duplicate tool name, keeping first registrant"
                );
            }
            CollisionPolicy::Reject => {
                tracing::error!(
                    tool = %name,
                    providers = ?[owner.as_str(), provider.id()],
                    "Duplicate tool name, rejecting"
                );
                index.entries.remove(&name);
                index.conflicted.insert(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderError, ProviderOutput};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Listing {
        id: String,
        names: Vec<&'static str>,
        fail: bool,
        list_calls: AtomicUsize,
    }

    impl Listing {
        fn new(id: &str, names: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                names,
                fail: false,
                list_calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                names: Vec::new(),
                fail: true,
                list_calls: AtomicUsize::new(0),
            })
        }
    }

    fn providers(list: &[&Arc<Listing>]) -> Vec<Arc<dyn Provider>> {
        list.iter()
            .map(|p| Arc::clone(*p) as Arc<dyn Provider>)
            .collect()
    }

    #[async_trait]
    impl Provider for Listing {
        fn id(&self) -> &str {
            &self.id
        }

        async fn list_tools(&self, _ctx: &ProviderContext) -> Result<Vec<ToolContract>, ProviderError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Connect("unreachable".into()));
            }
            Ok(self
                .names
                .iter()
                .map(|name| {
                    ToolContract::builder(*name, format!("{name} from {}", self.id))
                        .build()
                        .unwrap()
                })
                .collect())
        }

        async fn execute(
            &self,
            _ctx: &ProviderContext,
            _name: &str,
            _args: Map<String, Value>,
        ) -> Result<ProviderOutput, ProviderError> {
            Ok(ProviderOutput::Value(Value::String(self.id.clone())))
        }
    }

    #[tokio::test]
    async fn test_resolve_caches() {
        let provider = Listing::new("a", vec!["calculator"]);
        let resolver = Resolver::new(providers(&[&provider]), CollisionPolicy::FirstWins);

        for _ in 0..3 {
            let tool = resolver.resolve("calculator").await.unwrap();
            assert_eq!(tool.contract.name(), "calculator");
        }
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_wins() {
        let a = Listing::new("a", vec!["search"]);
        let b = Listing::new("b", vec!["search", "fetch"]);
        let resolver = Resolver::new(providers(&[&a, &b]), CollisionPolicy::FirstWins);

        let search = resolver.resolve("search").await.unwrap();
        assert_eq!(search.provider.id(), "a");
        assert_eq!(resolver.resolve("fetch").await.unwrap().provider.id(), "b");
    }

    #[tokio::test]
    async fn test_reject() {
        let a = Listing::new("a", vec!["search", "only_a"]);
        let b = Listing::new("b", vec!["search"]);
        let resolver = Resolver::new(providers(&[&a, &b]), CollisionPolicy::Reject);

        assert!(resolver.resolve("search").await.is_none());
        assert!(resolver.resolve("search").await.is_none());
        assert!(resolver.resolve("only_a").await.is_some());
        assert_eq!(a.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped() {
        let down = Listing::failing("down");
        let up = Listing::new("up", vec!["calculator"]);
        let resolver = Resolver::new(providers(&[&down, &up]), CollisionPolicy::FirstWins);
        assert_eq!(resolver.resolve("calculator").await.unwrap().provider.id(), "up");
    }

    #[tokio::test]
    async fn test_empty_provider_list() {
        let resolver = Resolver::new(Vec::new(), CollisionPolicy::FirstWins);
        assert!(resolver.resolve("anything").await.is_none());
        assert!(resolver.contracts().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_relists() {
        let provider = Listing::new("a", vec!["calculator"]);
        let resolver = Resolver::new(providers(&[&provider]), CollisionPolicy::FirstWins);

        resolver.resolve("calculator").await.unwrap();
        resolver.invalidate().await;
        resolver.resolve("calculator").await.unwrap();
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_build_once() {
        let provider = Listing::new("a", vec!["calculator"]);
        let resolver = Arc::new(Resolver::new(providers(&[&provider]), CollisionPolicy::FirstWins));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve("calculator").await.is_some() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 1);
    }
}

//! The tool registry.
//!
//! Holds an immutable snapshot of registered tools behind an `Arc`;
//! readers clone the snapshot without locking out a reload, and a
//! reload builds a complete replacement map before atomically swapping
//! it in. In-flight executions keep whatever descriptor they resolved
//! against the snapshot they started with.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use tandem_core::error::ToolError;
use tandem_core::tool::{ToolCall, ToolDefinition, ToolDescriptor, ToolResult, ToolSource};

use crate::truncation::bound_value;

type Snapshot = Arc<HashMap<String, Arc<ToolDescriptor>>>;

pub struct ToolRegistry {
    sources: Vec<Arc<dyn ToolSource>>,
    snapshot: RwLock<Option<Snapshot>>,
    /// Serializes reloads; readers never take it
    reload: Mutex<()>,
    result_token_ceiling: usize,
}

impl ToolRegistry {
    pub fn new(sources: Vec<Arc<dyn ToolSource>>, result_token_ceiling: usize) -> Self {
        Self {
            sources,
            snapshot: RwLock::new(None),
            reload: Mutex::new(()),
            result_token_ceiling,
        }
    }

    /// The current snapshot, loading lazily on first use. `force`
    /// rebuilds from every source even when a snapshot exists.
    ///
    /// A source that fails to enumerate fails the whole load; the
    /// previous snapshot (if any) stays in place.
    pub async fn load(&self, force: bool) -> Result<Snapshot, ToolError> {
        if !force
            && let Some(snapshot) = self.snapshot.read().await.clone()
        {
            return Ok(snapshot);
        }

        let _guard = self.reload.lock().await;

        // Another caller may have finished the same load while we waited
        if !force
            && let Some(snapshot) = self.snapshot.read().await.clone()
        {
            return Ok(snapshot);
        }

        let mut map: HashMap<String, Arc<ToolDescriptor>> = HashMap::new();
        for source in &self.sources {
            let descriptors = source.discover().await?;
            debug!(source = source.name(), count = descriptors.len(), "Discovered tools");
            for descriptor in descriptors {
                if map.contains_key(&descriptor.name) {
                    warn!(
                        tool = %descriptor.name,
                        source = source.name(),
                        "Duplicate tool name, later registration wins"
                    );
                }
                map.insert(descriptor.name.clone(), Arc::new(descriptor));
            }
        }

        let snapshot: Snapshot = Arc::new(map);
        *self.snapshot.write().await = Some(snapshot.clone());
        info!(tools = snapshot.len(), "Tool registry loaded");
        Ok(snapshot)
    }

    /// Definitions for every registered tool, sorted by name so request
    /// payloads are deterministic.
    pub async fn definitions(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let snapshot = self.load(false).await?;
        let mut definitions: Vec<ToolDefinition> =
            snapshot.values().map(|d| d.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    /// Execute a validated call. Infallible at the type level: unknown
    /// tools and executor failures become `success: false` results that
    /// flow back into the conversation.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let snapshot = match self.load(false).await {
            Ok(s) => s,
            Err(e) => {
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    format!("tool registry unavailable: {e}"),
                );
            }
        };

        let Some(descriptor) = snapshot.get(&call.name).cloned() else {
            return ToolResult::failure(&call.id, &call.name, format!("tool not found: {}", call.name));
        };

        match descriptor.executor.execute(call.arguments.clone()).await {
            Ok(payload) => {
                let (bounded, truncated) = bound_value(payload, self.result_token_ceiling);
                if truncated {
                    debug!(tool = %call.name, "Tool result truncated to fit budget");
                }
                ToolResult::ok(&call.id, &call.name, bounded)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(&call.id, &call.name, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tandem_core::tool::ToolExecutor;

    struct StaticExecutor(serde_json::Value);

    #[async_trait]
    impl ToolExecutor for StaticExecutor {
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(self.0.clone())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ToolExecutor for FailingExecutor {
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "upstream unavailable".into(),
            })
        }
    }

    /// Source whose payload can be swapped between loads, counting
    /// discover calls.
    struct CountingSource {
        tools: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
        discoveries: AtomicUsize,
    }

    impl CountingSource {
        fn new(tools: Vec<(&str, serde_json::Value)>) -> Arc<Self> {
            Arc::new(Self {
                tools: std::sync::Mutex::new(
                    tools.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
                ),
                discoveries: AtomicUsize::new(0),
            })
        }

        fn set_tools(&self, tools: Vec<(&str, serde_json::Value)>) {
            *self.tools.lock().unwrap() =
                tools.into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        }
    }

    #[async_trait]
    impl ToolSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            self.discoveries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .tools
                .lock()
                .unwrap()
                .iter()
                .map(|(name, payload)| ToolDescriptor {
                    name: name.clone(),
                    description: format!("static tool {name}"),
                    parameters: json!({"type": "object"}),
                    executor: Arc::new(StaticExecutor(payload.clone())),
                })
                .collect())
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: json!({}),
        }
    }

    #[tokio::test]
    async fn lazy_first_load() {
        let source = CountingSource::new(vec![("echo", json!("hi"))]);
        let registry = ToolRegistry::new(vec![source.clone()], 4000);

        assert_eq!(source.discoveries.load(Ordering::SeqCst), 0);
        registry.execute(&call("echo")).await;
        registry.execute(&call("echo")).await;
        // loaded once, reused after
        assert_eq!(source.discoveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forced_reload_picks_up_changes() {
        let source = CountingSource::new(vec![("alpha", json!(1))]);
        let registry = ToolRegistry::new(vec![source.clone()], 4000);

        registry.load(false).await.unwrap();
        source.set_tools(vec![("beta", json!(2))]);

        // without force, old snapshot persists
        assert!(!registry.execute(&call("beta")).await.success);

        registry.load(true).await.unwrap();
        assert!(registry.execute(&call("beta")).await.success);
        assert!(!registry.execute(&call("alpha")).await.success);
    }

    #[tokio::test]
    async fn in_flight_snapshot_survives_reload() {
        let source = CountingSource::new(vec![("alpha", json!(1))]);
        let registry = ToolRegistry::new(vec![source.clone()], 4000);

        let before = registry.load(false).await.unwrap();
        source.set_tools(vec![]);
        registry.load(true).await.unwrap();

        // the old snapshot still resolves the tool
        assert!(before.contains_key("alpha"));
        assert!(registry.load(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result() {
        let source = CountingSource::new(vec![]);
        let registry = ToolRegistry::new(vec![source], 4000);

        let result = registry.execute(&call("ghost")).await;
        assert!(!result.success);
        assert!(result.payload["error"].as_str().unwrap().contains("not found"));
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn executor_error_becomes_failure_result() {
        let descriptor = ToolDescriptor {
            name: "broken".into(),
            description: "always fails".into(),
            parameters: json!({"type": "object"}),
            executor: Arc::new(FailingExecutor),
        };

        struct OneShot(std::sync::Mutex<Option<ToolDescriptor>>);

        #[async_trait]
        impl ToolSource for OneShot {
            fn name(&self) -> &str {
                "oneshot"
            }
            async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
                Ok(self.0.lock().unwrap().take().into_iter().collect())
            }
        }

        let registry = ToolRegistry::new(
            vec![Arc::new(OneShot(std::sync::Mutex::new(Some(descriptor))))],
            4000,
        );

        let result = registry.execute(&call("broken")).await;
        assert!(!result.success);
        assert!(
            result.payload["error"]
                .as_str()
                .unwrap()
                .contains("upstream unavailable")
        );
    }

    #[tokio::test]
    async fn duplicate_names_last_source_wins() {
        let first = CountingSource::new(vec![("dup", json!("first"))]);
        let second = CountingSource::new(vec![("dup", json!("second"))]);
        let registry = ToolRegistry::new(vec![first, second], 4000);

        let result = registry.execute(&call("dup")).await;
        assert_eq!(result.payload, json!("second"));
    }

    #[tokio::test]
    async fn definitions_sorted_by_name() {
        let source = CountingSource::new(vec![
            ("zeta", json!(1)),
            ("alpha", json!(2)),
            ("mid", json!(3)),
        ]);
        let registry = ToolRegistry::new(vec![source], 4000);

        let defs = registry.definitions().await.unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn oversized_result_bounded() {
        let big: Vec<serde_json::Value> = (0..10_000).map(|i| json!(i)).collect();
        let source = CountingSource::new(vec![("dump", serde_json::Value::Array(big))]);
        let registry = ToolRegistry::new(vec![source], 500);

        let result = registry.execute(&call("dump")).await;
        assert!(result.success);
        assert_eq!(result.payload["original_length"], 10_000);
        assert_eq!(result.payload["truncated"], true);
    }
}

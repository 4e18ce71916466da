//! Batch execution of tool calls with ordering guarantees.
//!
//! Whatever the strategy, outcomes come back in the order of the
//! assistant message's tool calls, never in completion order.

use std::num::NonZeroUsize;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use vellum_types::{ToolCall, ToolError};

use crate::{ToolCallRequest, ToolRegistry};

/// How a batch of tool calls is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// One call at a time, in order.
    #[default]
    Sequential,
    /// All calls at once.
    Parallel,
    /// At most `n` calls in flight.
    ParallelWithLimit(NonZeroUsize),
}

/// Result of one call within a batch.
#[derive(Debug)]
pub struct ToolCallOutcome {
    /// The originating call id.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// Handler result or error.
    pub result: Result<serde_json::Value, ToolError>,
}

/// Execute a batch of tool calls against the registry.
///
/// With parallel strategies, handlers run concurrently but the returned
/// outcomes are ordered by the input `calls` slice. A per-call timeout,
/// when set, turns an overrunning handler into [`ToolError::Timeout`].
pub async fn execute_calls(
    registry: &ToolRegistry,
    calls: &[ToolCall],
    strategy: ExecutionStrategy,
    timeout: Option<Duration>,
) -> Vec<ToolCallOutcome> {
    match strategy {
        ExecutionStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                outcomes.push(run_one(registry, call, timeout).await);
            }
            outcomes
        }
        ExecutionStrategy::Parallel => {
            futures::future::join_all(calls.iter().map(|call| run_one(registry, call, timeout)))
                .await
        }
        ExecutionStrategy::ParallelWithLimit(limit) => {
            stream::iter(calls.iter().map(|call| run_one(registry, call, timeout)))
                .buffered(limit.get())
                .collect()
                .await
        }
    }
}

async fn run_one(
    registry: &ToolRegistry,
    call: &ToolCall,
    timeout: Option<Duration>,
) -> ToolCallOutcome {
    let request = ToolCallRequest {
        function_name: call.name.clone(),
        arguments: call.arguments.clone(),
    };
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, registry.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                id: call.id.clone(),
            }),
        },
        None => registry.execute(request).await,
    };
    ToolCallOutcome {
        id: call.id.clone(),
        name: call.name.clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParameterSchema, Tool, ToolHandler};
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for the duration named in its arguments, then echoes it.
    struct SleepTool;

    impl ToolHandler for SleepTool {
        fn call(
            &self,
            arguments: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>
        {
            Box::pin(async move {
                let ms = arguments["ms"].as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({"slept_ms": ms}))
            })
        }
    }

    fn sleep_registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Tool::new(
            "sleep",
            "Sleep then echo",
            ParameterSchema::object(
                [("ms", ParameterSchema::Integer { description: None })],
                &["ms"],
            ),
            Arc::new(SleepTool),
        ))
        .unwrap();
        reg
    }

    fn calls(durations: &[u64]) -> Vec<ToolCall> {
        durations
            .iter()
            .enumerate()
            .map(|(i, ms)| ToolCall::new(format!("call_{i}"), "sleep", json!({"ms": ms})))
            .collect()
    }

    #[tokio::test]
    async fn sequential_preserves_order() {
        let registry = sleep_registry();
        let outcomes = execute_calls(
            &registry,
            &calls(&[5, 1]),
            ExecutionStrategy::Sequential,
            None,
        )
        .await;
        assert_eq!(outcomes[0].id, "call_0");
        assert_eq!(outcomes[1].id, "call_1");
    }

    #[tokio::test]
    async fn parallel_outcomes_follow_call_order_not_completion_order() {
        let registry = sleep_registry();
        // First call finishes last; ordering must still match input.
        let outcomes = execute_calls(
            &registry,
            &calls(&[40, 1, 10]),
            ExecutionStrategy::Parallel,
            None,
        )
        .await;
        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["call_0", "call_1", "call_2"]);
        assert_eq!(outcomes[0].result.as_ref().unwrap()["slept_ms"], 40);
    }

    #[tokio::test]
    async fn limited_parallelism_preserves_order() {
        let registry = sleep_registry();
        let outcomes = execute_calls(
            &registry,
            &calls(&[20, 5, 1, 1]),
            ExecutionStrategy::ParallelWithLimit(NonZeroUsize::new(2).unwrap()),
            None,
        )
        .await;
        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["call_0", "call_1", "call_2", "call_3"]);
    }

    #[tokio::test]
    async fn timeout_yields_timeout_error_with_call_id() {
        let registry = sleep_registry();
        let outcomes = execute_calls(
            &registry,
            &calls(&[500]),
            ExecutionStrategy::Sequential,
            Some(Duration::from_millis(10)),
        )
        .await;
        assert!(
            matches!(&outcomes[0].result, Err(ToolError::Timeout { id }) if id == "call_0")
        );
    }

    #[tokio::test]
    async fn parallel_runs_are_actually_concurrent() {
        static PEAK: AtomicUsize = AtomicUsize::new(0);
        static ACTIVE: AtomicUsize = AtomicUsize::new(0);

        struct Gauge;
        impl ToolHandler for Gauge {
            fn call(
                &self,
                _arguments: serde_json::Value,
            ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>
            {
                Box::pin(async {
                    let now = ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    ACTIVE.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!({}))
                })
            }
        }

        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::new(
                "gauge",
                "Tracks concurrency",
                ParameterSchema::empty_object(),
                Arc::new(Gauge),
            ))
            .unwrap();

        let batch: Vec<ToolCall> = (0..3)
            .map(|i| ToolCall::new(format!("call_{i}"), "gauge", json!({})))
            .collect();
        execute_calls(&registry, &batch, ExecutionStrategy::Parallel, None).await;
        assert!(PEAK.load(Ordering::SeqCst) >= 2, "expected overlap");
    }

    #[tokio::test]
    async fn failures_do_not_disturb_ordering() {
        let mut registry = sleep_registry();
        registry
            .register(Tool::from_fn(
                "broken",
                "Always fails",
                ParameterSchema::empty_object(),
                |_| {
                    Err(ToolError::ExecutionFailed {
                        name: "broken".into(),
                        message: "nope".into(),
                        cause: None,
                    })
                },
            ))
            .unwrap();
        let batch = vec![
            ToolCall::new("call_0", "broken", json!({})),
            ToolCall::new("call_1", "sleep", json!({"ms": 1})),
        ];
        let outcomes =
            execute_calls(&registry, &batch, ExecutionStrategy::Parallel, None).await;
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
    }
}

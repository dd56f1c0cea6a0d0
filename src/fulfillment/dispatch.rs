//! Turns a recognized order into one fulfillment attempt.
//!
//! The [`Dispatcher`] owns the [`ModelCache`] and is the only thing that
//! mutates it.  Dispatch never returns an error: every attempt ends in a
//! [`DispatchOutcome`].

use std::fmt;
use std::sync::Arc;

use crate::config::{DatasetConfig, RobotConfig};
use crate::menu::MenuItem;

use super::cache::{ModelCache, ResolveError};
use super::command::FulfillmentCommand;
use super::executor::{ExecutorError, FulfillmentExecutor};

/// Result of trying to serve one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The executor ran and exited successfully.
    Served,
    /// No fulfillment model is registered for the order; nothing ran.
    NoModel,
    /// The executor could not be started or exited unsuccessfully.
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_served(&self) -> bool {
        matches!(self, DispatchOutcome::Served)
    }

    /// Short label used in notification payloads.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Served => "served",
            DispatchOutcome::NoModel => "no_model",
            DispatchOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Resolves an order's model and runs the executor for it.
pub struct Dispatcher {
    cache: ModelCache,
    executor: Arc<dyn FulfillmentExecutor>,
    robot: RobotConfig,
    dataset: DatasetConfig,
}

impl Dispatcher {
    pub fn new(
        cache: ModelCache,
        executor: Arc<dyn FulfillmentExecutor>,
        robot: RobotConfig,
        dataset: DatasetConfig,
    ) -> Self {
        Self {
            cache,
            executor,
            robot,
            dataset,
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Build the command for `order`, or `None` when no model is registered.
    ///
    /// A registered model that fails to resolve locally is passed to the
    /// executor as its remote repository id.
    pub async fn prepare(&mut self, order: &MenuItem) -> Option<FulfillmentCommand> {
        let repo_id = self.cache.repo_id(order.as_str())?.to_string();

        let policy_path = match self.cache.resolve(order.as_str()).await {
            Ok(path) => path.display().to_string(),
            Err(ResolveError::Unregistered(_)) => return None,
            Err(e) => {
                log::warn!("dispatch: {e}; passing {repo_id} to the executor");
                repo_id
            }
        };

        Some(FulfillmentCommand::new(
            &self.robot,
            &self.dataset,
            order,
            policy_path,
        ))
    }

    /// Serve one order.
    pub async fn dispatch(&mut self, order: &MenuItem) -> DispatchOutcome {
        let Some(command) = self.prepare(order).await else {
            log::warn!("dispatch: no model available for '{order}'");
            return DispatchOutcome::NoModel;
        };

        let dataset_dir = command.dataset_dir();
        log::info!(
            "dispatch: serving '{order}' with {} (dataset {} {}, resume={})",
            command.policy_path,
            dataset_dir.display(),
            if dataset_dir.exists() { "exists" } else { "is new" },
            command.resume
        );

        let executor = Arc::clone(&self.executor);
        let result = tokio::task::spawn_blocking(move || executor.execute(&command))
            .await
            .map_err(|e| ExecutorError::Join(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(()) => {
                log::info!("dispatch: served '{order}'");
                DispatchOutcome::Served
            }
            Err(e) => {
                log::error!("dispatch: failed to serve '{order}': {e}");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Resolve the models for all `orders` up front, then serve each in
    /// turn.  One order's failure does not stop the rest.
    pub async fn dispatch_all(&mut self, orders: &[MenuItem]) -> Vec<(MenuItem, DispatchOutcome)> {
        if orders.is_empty() {
            log::info!("dispatch: no orders to execute");
            return Vec::new();
        }

        let names: Vec<&str> = orders.iter().map(MenuItem::as_str).collect();
        self.cache.resolve_all(&names).await;

        let mut outcomes = Vec::with_capacity(orders.len());
        for order in orders {
            let outcome = self.dispatch(order).await;
            outcomes.push((order.clone(), outcome));
        }
        outcomes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::fulfillment::cache::{ArtifactStore, CountingStore};
    use crate::fulfillment::executor::RecordingExecutor;
    use crate::menu::Menu;

    struct Rig {
        store: Arc<CountingStore>,
        executor: Arc<RecordingExecutor>,
        dispatcher: Dispatcher,
        menu: Menu,
    }

    fn rig(store: CountingStore, executor: RecordingExecutor) -> Rig {
        let registry: BTreeMap<String, String> = [
            ("egg", "ns/ServeEggSushi"),
            ("tuna", "ns/ServeTunaSushi"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let store = Arc::new(store);
        let executor = Arc::new(executor);
        let dyn_store: Arc<dyn ArtifactStore> = store.clone();
        let dyn_exec: Arc<dyn FulfillmentExecutor> = executor.clone();

        let dataset = DatasetConfig {
            run_root: Some(PathBuf::from("/nonexistent/run-root")),
            ..DatasetConfig::default()
        };
        let cache = ModelCache::new(registry, dyn_store, Some(PathBuf::from("/models")));

        Rig {
            store,
            executor,
            dispatcher: Dispatcher::new(cache, dyn_exec, RobotConfig::default(), dataset),
            menu: Menu::new(["egg", "tuna", "cucumber roll"]).unwrap(),
        }
    }

    fn item(menu: &Menu, name: &str) -> MenuItem {
        menu.get(name).unwrap().clone()
    }

    #[tokio::test]
    async fn registered_order_is_served_with_local_policy() {
        let mut r = rig(CountingStore::default(), RecordingExecutor::default());
        let tuna = item(&r.menu, "tuna");

        let outcome = r.dispatcher.dispatch(&tuna).await;
        assert!(outcome.is_served());

        let commands = r.executor.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].policy_path, "/models/ns--ServeTunaSushi");
        assert_eq!(commands[0].task, "Serve tuna sushi");
        assert_eq!(commands[0].dataset_id, "your_hf_username/eval_tuna");
        assert!(commands[0].resume);
    }

    #[tokio::test]
    async fn unregistered_order_runs_nothing() {
        let mut r = rig(CountingStore::default(), RecordingExecutor::default());
        let roll = item(&r.menu, "cucumber roll");

        let outcome = r.dispatcher.dispatch(&roll).await;
        assert_eq!(outcome, DispatchOutcome::NoModel);
        assert!(!outcome.is_served());
        assert!(r.executor.commands().is_empty());
        assert_eq!(r.store.total(), 0);
    }

    #[tokio::test]
    async fn failed_resolution_passes_remote_id() {
        let mut r = rig(
            CountingStore::failing_for(&["ns/ServeEggSushi"]),
            RecordingExecutor::default(),
        );
        let egg = item(&r.menu, "egg");

        assert_eq!(r.dispatcher.dispatch(&egg).await, DispatchOutcome::Served);
        assert_eq!(r.executor.commands()[0].policy_path, "ns/ServeEggSushi");
    }

    #[tokio::test]
    async fn executor_failure_is_an_outcome_not_an_error() {
        let mut r = rig(
            CountingStore::default(),
            RecordingExecutor::failing_for(&["Serve egg sushi"]),
        );
        let egg = item(&r.menu, "egg");

        let outcome = r.dispatcher.dispatch(&egg).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(ref reason) if reason.contains("exit")));
        assert_eq!(outcome.label(), "failed");
        assert!(!outcome.is_served());
    }

    #[tokio::test]
    async fn dispatch_all_resolves_once_and_continues_past_failures() {
        let mut r = rig(
            CountingStore::default(),
            RecordingExecutor::failing_for(&["Serve egg sushi"]),
        );
        let orders = vec![
            item(&r.menu, "egg"),
            item(&r.menu, "cucumber roll"),
            item(&r.menu, "tuna"),
        ];

        let outcomes = r.dispatcher.dispatch_all(&orders).await;
        let labels: Vec<&str> = outcomes.iter().map(|(_, o)| o.label()).collect();

        assert_eq!(labels, vec!["failed", "no_model", "served"]);
        assert_eq!(r.store.fetch_count("ns/ServeEggSushi"), 1);
        assert_eq!(r.store.fetch_count("ns/ServeTunaSushi"), 1);
        assert_eq!(r.executor.commands().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_all_with_no_orders_is_empty() {
        let mut r = rig(CountingStore::default(), RecordingExecutor::default());
        assert!(r.dispatcher.dispatch_all(&[]).await.is_empty());
        assert_eq!(r.store.total(), 0);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(DispatchOutcome::Served.to_string(), "served");
        assert_eq!(
            DispatchOutcome::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }
}

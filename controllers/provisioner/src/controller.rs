//! Provisioner controller
//!
//! Builds the provisioning graph, evaluates it against the state file and
//! publishes outputs. In loop mode the whole graph is re-evaluated on an
//! interval; failed evaluations are retried with Fibonacci backoff.

use crate::backoff::FibonacciBackoff;
use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::metrics::Metrics;
use crate::pipeline;
use crate::publish;
use crate::resources::{SharedHcloud, SharedMachineApi};
use crate::server::ProbeState;
use resource_graph::{Engine, Report, StateStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct Controller<S: StateStore> {
    config: ProvisionerConfig,
    hcloud: SharedHcloud,
    talos: SharedMachineApi,
    engine: Engine<S>,
    probes: ProbeState,
}

impl<S: StateStore> Controller<S> {
    /// Create a controller; the cloud token is validated before anything is declared
    pub async fn new(
        config: ProvisionerConfig,
        hcloud: SharedHcloud,
        talos: SharedMachineApi,
        store: S,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ProvisionerError> {
        info!("Validating Hetzner Cloud token and connectivity...");
        hcloud.validate_token().await.map_err(|e| {
            error!("Failed to validate Hetzner Cloud token: {}", e);
            error!("Please ensure:");
            error!("  1. HCLOUD_TOKEN is set to a read/write API token");
            error!("  2. The API is reachable at {}", hcloud.base_url());
            ProvisionerError::Hcloud(e)
        })?;
        info!("Hetzner Cloud token validated");

        let engine = if config.preview {
            Engine::preview(store)
        } else {
            Engine::new(store)
        };

        Ok(Self {
            config,
            hcloud,
            talos,
            engine,
            probes: ProbeState::new(metrics),
        })
    }

    pub fn probes(&self) -> &ProbeState {
        &self.probes
    }

    /// Evaluate the graph once; publish outputs if everything converged
    pub async fn evaluate(&self) -> Result<Report, ProvisionerError> {
        let result = self.evaluate_and_publish().await;
        if result.is_err() {
            self.probes.set_ready(false);
        }
        result
    }

    async fn evaluate_and_publish(&self) -> Result<Report, ProvisionerError> {
        let pipeline = pipeline::build(&self.config, Arc::clone(&self.hcloud), Arc::clone(&self.talos))?;

        let started = Instant::now();
        let report = match self.engine.evaluate(&pipeline.graph).await {
            Ok(report) => report,
            Err(e) => {
                self.probes.metrics.evaluation_error();
                return Err(e.into());
            }
        };
        self.probes.metrics.observe(&report, started.elapsed());

        for (id, action) in report.changes() {
            info!("  {:?} {}", action, id);
        }
        for (id, message) in report.failures() {
            error!("  {} failed: {}", id, message);
        }
        for id in report.blocked() {
            warn!("  {} blocked", id);
        }

        if self.config.preview {
            info!("Preview finished: {}", report.summary());
            return Ok(report);
        }

        if report.is_success() {
            let state = self.engine.store().load()?;
            let outputs = publish::collect(&self.config, &pipeline.ids, &state)?;
            publish::publish(&self.config, outputs)?;
        }
        self.probes.set_ready(report.is_success());
        Ok(report)
    }

    /// Evaluate once, or forever when a reconcile interval is configured
    pub async fn run(&self) -> Result<(), ProvisionerError> {
        let Some(interval) = self.config.reconcile_interval else {
            let report = self.evaluate().await?;
            report.into_result()?;
            return Ok(());
        };

        let mut backoff = FibonacciBackoff::default();
        loop {
            let wait = match self.evaluate().await {
                Ok(report) if report.is_success() => {
                    backoff.reset();
                    interval
                }
                Ok(report) => {
                    let wait = backoff.next_backoff();
                    warn!(
                        "Evaluation did not converge ({}), retrying in {}s",
                        report.summary(),
                        wait.as_secs()
                    );
                    wait
                }
                Err(e) => {
                    let wait = backoff.next_backoff();
                    error!("Evaluation failed: {}, retrying in {}s", e, wait.as_secs());
                    wait
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcloud_client::MockHcloudClient;
    use resource_graph::{MemoryStateStore, Outputs};
    use std::collections::HashMap;
    use talos_client::MockMachineApi;

    fn config(dir: &std::path::Path, preview: bool) -> ProvisionerConfig {
        let env = HashMap::from([
            ("HCLOUD_TOKEN".to_string(), "token".to_string()),
            ("OUTPUTS_FILE".to_string(), dir.join("outputs.json").display().to_string()),
            ("PREVIEW".to_string(), preview.to_string()),
        ]);
        ProvisionerConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
    }

    async fn controller(
        config: ProvisionerConfig,
        hcloud: &MockHcloudClient,
        store: MemoryStateStore,
    ) -> Result<Controller<MemoryStateStore>, ProvisionerError> {
        Controller::new(
            config,
            Arc::new(hcloud.clone()),
            Arc::new(MockMachineApi::new()),
            store,
            Arc::new(Metrics::new().unwrap()),
        )
        .await
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let dir = std::env::temp_dir().join(format!("controller-{}", uuid::Uuid::new_v4()));
        let hcloud = MockHcloudClient::new();
        hcloud.fail_on("validate_token");
        let result = controller(config(&dir, false), &hcloud, MemoryStateStore::default()).await;
        assert!(matches!(result, Err(ProvisionerError::Hcloud(_))));
    }

    #[tokio::test]
    async fn test_run_once_publishes_outputs() {
        let dir = std::env::temp_dir().join(format!("controller-{}", uuid::Uuid::new_v4()));
        let config = config(&dir, false);
        let hcloud = MockHcloudClient::new();
        let controller = controller(config.clone(), &hcloud, MemoryStateStore::default()).await.unwrap();

        controller.run().await.unwrap();
        assert!(controller.probes().is_ready());

        let outputs = Outputs::load(&config.outputs_file).unwrap();
        assert!(outputs.get(publish::KUBECONFIG).is_some());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_preview_publishes_nothing() {
        let dir = std::env::temp_dir().join(format!("controller-{}", uuid::Uuid::new_v4()));
        let config = config(&dir, true);
        let hcloud = MockHcloudClient::new();
        let controller = controller(config.clone(), &hcloud, MemoryStateStore::default()).await.unwrap();

        let report = controller.evaluate().await.unwrap();
        assert!(report.is_success());
        assert!(!config.outputs_file.exists());
        assert!(hcloud.calls().is_empty());
    }

    /// Memory store whose loads can be made to fail
    #[derive(Clone, Default)]
    struct BreakableStore {
        inner: MemoryStateStore,
        broken: Arc<std::sync::atomic::AtomicBool>,
    }

    impl StateStore for BreakableStore {
        fn load(&self) -> Result<resource_graph::GraphState, resource_graph::GraphError> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(resource_graph::GraphError::State("state file unreadable".to_string()));
            }
            self.inner.load()
        }

        fn save(&self, state: &resource_graph::GraphState) -> Result<(), resource_graph::GraphError> {
            self.inner.save(state)
        }
    }

    #[tokio::test]
    async fn test_evaluation_error_clears_readiness() {
        let dir = std::env::temp_dir().join(format!("controller-{}", uuid::Uuid::new_v4()));
        let store = BreakableStore::default();
        let controller = Controller::new(
            config(&dir, false),
            Arc::new(MockHcloudClient::new()),
            Arc::new(MockMachineApi::new()),
            store.clone(),
            Arc::new(Metrics::new().unwrap()),
        )
        .await
        .unwrap();

        controller.evaluate().await.unwrap();
        assert!(controller.probes().is_ready());

        store.broken.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(controller.evaluate().await, Err(ProvisionerError::Graph(_))));
        assert!(!controller.probes().is_ready());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_run_is_an_error() {
        let dir = std::env::temp_dir().join(format!("controller-{}", uuid::Uuid::new_v4()));
        let hcloud = MockHcloudClient::new();
        hcloud.fail_on("create_server");
        let controller = controller(config(&dir, false), &hcloud, MemoryStateStore::default()).await.unwrap();

        assert!(matches!(controller.run().await, Err(ProvisionerError::Graph(_))));
        assert!(!controller.probes().is_ready());
    }
}

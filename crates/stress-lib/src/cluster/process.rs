//! Cluster manager backed by local child processes
//!
//! Each worker is a `stress-agent` process listening on its own port.
//! Status comes from the child's liveness, health from the agent's
//! `/readyz` endpoint. The agent names itself in that response; a port that
//! answers with any other name belongs to some other process.

use super::{
    ClusterManager, HealthLookup, HealthState, ProcessStatusReport, ServiceStatus,
    WorkerDescriptor, WorkerHandle,
};
use crate::error::ClusterError;
use crate::health::ReadinessResponse;
use crate::models::AgentEndpoint;
use crate::rpc::EndpointResolver;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for the process-backed cluster manager
#[derive(Debug, Clone)]
pub struct ProcessClusterConfig {
    /// Path to the agent binary
    pub agent_binary: PathBuf,
    /// Extra arguments passed to every agent
    pub agent_args: Vec<String>,
    /// Host the agents listen on
    pub host: String,
    /// First port handed out to an agent
    pub base_port: u16,
    /// Timeout for a single health probe
    pub probe_timeout: Duration,
    /// Grace period after SIGTERM before a non-forced delete kills the agent
    pub graceful_stop: Duration,
}

impl Default for ProcessClusterConfig {
    fn default() -> Self {
        Self {
            agent_binary: PathBuf::from("stress-agent"),
            agent_args: Vec::new(),
            host: "127.0.0.1".to_string(),
            base_port: 9100,
            probe_timeout: Duration::from_secs(2),
            graceful_stop: Duration::from_secs(5),
        }
    }
}

struct ManagedWorker {
    port: u16,
    child: Mutex<Child>,
}

pub struct ProcessClusterManager {
    config: ProcessClusterConfig,
    workers: DashMap<String, Arc<ManagedWorker>>,
    next_port: AtomicU16,
    http: reqwest::Client,
}

impl ProcessClusterManager {
    pub fn new(config: ProcessClusterConfig) -> Result<Self, ClusterError> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| ClusterError::HealthLookup {
                service: "probe client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            next_port: AtomicU16::new(config.base_port),
            config,
            workers: DashMap::new(),
            http,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn base_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.config.host, port)
    }

    fn worker(&self, handle: &WorkerHandle) -> Result<Arc<ManagedWorker>, ClusterError> {
        self.workers
            .get(&handle.service_name)
            .map(|w| w.value().clone())
            .ok_or_else(|| ClusterError::NotFound(handle.service_name.clone()))
    }

    async fn probe_health(&self, handle: &WorkerHandle, port: u16) -> Result<HealthLookup, ClusterError> {
        let url = format!("{}/readyz", self.base_url(port));

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            // Listener not bound yet
            Err(e) if e.is_connect() => return Ok(HealthLookup::NotIndexed),
            Err(e) if e.is_timeout() => return Ok(HealthLookup::State(HealthState::Unknown)),
            Err(e) => {
                return Err(ClusterError::HealthLookup {
                    service: handle.service_name.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let status = response.status();
        let answered_by = response
            .json::<ReadinessResponse>()
            .await
            .ok()
            .and_then(|readiness| readiness.service);

        if answered_by.as_deref() != Some(handle.service_name.as_str()) {
            warn!(
                worker = %handle.service_name,
                port = port,
                answered_by = ?answered_by,
                "Agent port is held by another process"
            );
            return Err(ClusterError::HealthLookup {
                service: handle.service_name.clone(),
                reason: format!(
                    "port {} answered as {}",
                    port,
                    answered_by.as_deref().unwrap_or("an unknown service")
                ),
            });
        }

        if status.is_success() {
            Ok(HealthLookup::State(HealthState::Ok))
        } else {
            debug!(worker = %handle.service_name, status = %status, "Agent not ready");
            Ok(HealthLookup::State(HealthState::Warning))
        }
    }
}

#[async_trait]
impl ClusterManager for ProcessClusterManager {
    async fn create_worker_process(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<WorkerHandle, ClusterError> {
        let mut causes = descriptor.validate();
        if self.workers.contains_key(&descriptor.service_name) {
            causes.push("worker already exists".to_string());
        }
        if !causes.is_empty() {
            return Err(ClusterError::Create {
                service: descriptor.service_name.clone(),
                causes,
            });
        }

        if let Some(constraint) = &descriptor.placement_constraints {
            debug!(constraint = %constraint, "Placement constraints ignored for local processes");
        }

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let child = Command::new(&self.config.agent_binary)
            .args(&self.config.agent_args)
            .env("AGENT_PORT", port.to_string())
            .env("AGENT_SERVICE_NAME", &descriptor.service_name)
            .env("AGENT_AGENT_ID", descriptor.agent_id.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClusterError::Create {
                service: descriptor.service_name.clone(),
                causes: vec![format!(
                    "failed to spawn {}: {}",
                    self.config.agent_binary.display(),
                    e
                )],
            })?;

        info!(
            worker = %descriptor.service_name,
            agent_id = %descriptor.agent_id,
            pid = ?child.id(),
            port = port,
            "Spawned agent process"
        );

        self.workers.insert(
            descriptor.service_name.clone(),
            Arc::new(ManagedWorker {
                port,
                child: Mutex::new(child),
            }),
        );

        Ok(WorkerHandle {
            service_name: descriptor.service_name.clone(),
        })
    }

    async fn delete_worker_process(
        &self,
        handle: &WorkerHandle,
        force: bool,
    ) -> Result<(), ClusterError> {
        let (_, worker) = self
            .workers
            .remove(&handle.service_name)
            .ok_or_else(|| ClusterError::NotFound(handle.service_name.clone()))?;
        let mut child = worker.child.lock().await;

        if let Ok(Some(status)) = child.try_wait() {
            debug!(worker = %handle.service_name, status = %status, "Agent process already exited");
            return Ok(());
        }

        if !force {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                // SAFETY: plain signal delivery to a pid we spawned.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                if tokio::time::timeout(self.config.graceful_stop, child.wait())
                    .await
                    .is_ok()
                {
                    info!(worker = %handle.service_name, "Agent process stopped");
                    return Ok(());
                }
                warn!(worker = %handle.service_name, "Agent ignored SIGTERM, killing");
            }
        }

        child.kill().await.map_err(|e| ClusterError::Delete {
            service: handle.service_name.clone(),
            reason: e.to_string(),
        })?;
        info!(worker = %handle.service_name, force = force, "Agent process killed");
        Ok(())
    }

    async fn query_process_status(
        &self,
        handle: &WorkerHandle,
    ) -> Result<ProcessStatusReport, ClusterError> {
        let worker = self.worker(handle)?;

        let exited = {
            let mut child = worker.child.lock().await;
            !matches!(child.try_wait(), Ok(None))
        };
        if exited {
            return Ok(ProcessStatusReport {
                status: ServiceStatus::Failed,
                health: HealthLookup::State(HealthState::Error),
            });
        }

        let health = self.probe_health(handle, worker.port).await?;
        Ok(ProcessStatusReport {
            status: ServiceStatus::Active,
            health,
        })
    }
}

impl EndpointResolver for ProcessClusterManager {
    fn resolve(&self, endpoint: &AgentEndpoint) -> Option<String> {
        self.workers
            .get(&endpoint.service_name)
            .map(|w| self.base_url(w.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentId;

    fn manager(binary: &str) -> ProcessClusterManager {
        ProcessClusterManager::new(ProcessClusterConfig {
            agent_binary: PathBuf::from(binary),
            base_port: 19_100,
            ..Default::default()
        })
        .unwrap()
    }

    fn descriptor() -> WorkerDescriptor {
        let endpoint = AgentEndpoint::for_agent("test-app", AgentId::new());
        WorkerDescriptor::for_agent("test-app", &endpoint, None)
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_create_failure() {
        let manager = manager("/nonexistent/stress-agent");

        let result = manager.create_worker_process(&descriptor()).await;
        assert!(matches!(result, Err(ClusterError::Create { .. })));
        assert_eq!(manager.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_worker_is_not_found() {
        let manager = manager("stress-agent");
        let handle = WorkerHandle {
            service_name: "test-app/agent_missing".to_string(),
        };

        assert!(matches!(
            manager.query_process_status(&handle).await,
            Err(ClusterError::NotFound(_))
        ));
        assert!(matches!(
            manager.delete_worker_process(&handle, true).await,
            Err(ClusterError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_running_process_without_listener_is_not_indexed() {
        let manager = ProcessClusterManager::new(ProcessClusterConfig {
            agent_binary: PathBuf::from("sleep"),
            agent_args: vec!["5".to_string()],
            base_port: 19_150,
            ..Default::default()
        })
        .unwrap();

        let handle = manager.create_worker_process(&descriptor()).await.unwrap();

        let report = manager.query_process_status(&handle).await.unwrap();
        assert_eq!(report.status, ServiceStatus::Active);
        assert_eq!(report.health, HealthLookup::NotIndexed);

        let endpoint = AgentEndpoint {
            agent_id: AgentId::new(),
            service_name: handle.service_name.clone(),
        };
        assert_eq!(
            manager.resolve(&endpoint),
            Some("http://127.0.0.1:19150".to_string())
        );

        manager.delete_worker_process(&handle, true).await.unwrap();
        assert_eq!(manager.worker_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_delete_uses_sigterm() {
        let manager = ProcessClusterManager::new(ProcessClusterConfig {
            agent_binary: PathBuf::from("sleep"),
            agent_args: vec!["30".to_string()],
            base_port: 19_160,
            graceful_stop: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let handle = manager.create_worker_process(&descriptor()).await.unwrap();
        let started = std::time::Instant::now();

        manager.delete_worker_process(&handle, false).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    /// Serve a `/readyz` that answers as `service` on a free local port
    async fn readyz_listener(service: &str) -> u16 {
        use crate::health::HealthRegistry;

        let registry = HealthRegistry::new().with_service(service);
        registry.set_ready(true).await;
        let app = crate::ops::router(registry);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    fn sleeper_on(port: u16) -> ProcessClusterManager {
        ProcessClusterManager::new(ProcessClusterConfig {
            agent_binary: PathBuf::from("sleep"),
            agent_args: vec!["5".to_string()],
            base_port: port,
            ..Default::default()
        })
        .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_port_held_by_another_agent_is_not_ready() {
        let port = readyz_listener("old-run/agent_stale").await;
        let manager = sleeper_on(port);

        let handle = manager.create_worker_process(&descriptor()).await.unwrap();
        let result = manager.query_process_status(&handle).await;

        match result {
            Err(ClusterError::HealthLookup { reason, .. }) => {
                assert!(reason.contains("old-run/agent_stale"));
            }
            other => panic!("expected a health lookup failure, got {:?}", other),
        }

        manager.delete_worker_process(&handle, true).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_matching_service_name_is_ready() {
        let descriptor = descriptor();
        let port = readyz_listener(&descriptor.service_name).await;
        let manager = sleeper_on(port);

        let handle = manager.create_worker_process(&descriptor).await.unwrap();
        let report = manager.query_process_status(&handle).await.unwrap();

        assert!(report.is_ready());

        manager.delete_worker_process(&handle, true).await.unwrap();
    }
}

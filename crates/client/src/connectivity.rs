//! Backend reachability, published as a watchable status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use reqflow_core::config::ConnectivityConfig;
use reqflow_core::errors::{ApplicationError, ErrorKind};

use crate::api::{ApiClient, RequisitionApi};
use crate::local::InProcessApi;
use crate::schedule::{LatestWins, ScheduledTask};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Checking,
    Connected,
    /// The backend could not be reached at all.
    Disconnected,
    /// The backend answered, but not healthily.
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_checked: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

impl ConnectionStatus {
    pub fn checking() -> Self {
        Self { state: ConnectionState::Checking, last_checked: None, detail: None }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<(), ApplicationError>;
}

#[async_trait]
impl HealthProbe for ApiClient {
    async fn probe(&self) -> Result<(), ApplicationError> {
        self.health().await
    }
}

#[async_trait]
impl HealthProbe for InProcessApi {
    async fn probe(&self) -> Result<(), ApplicationError> {
        self.health().await
    }
}

/// Runs a single probe bounded by `timeout`.
pub async fn check_once(probe: &dyn HealthProbe, timeout: Duration) -> ConnectionStatus {
    let outcome = tokio::time::timeout(timeout, probe.probe()).await;
    let (state, detail) = match outcome {
        Ok(Ok(())) => (ConnectionState::Connected, None),
        Ok(Err(error)) if error.kind() == ErrorKind::Connectivity => {
            (ConnectionState::Disconnected, Some(error.to_string()))
        }
        Ok(Err(error)) => (ConnectionState::Error, Some(error.to_string())),
        Err(_) => (
            ConnectionState::Disconnected,
            Some(format!("health check timed out after {}ms", timeout.as_millis())),
        ),
    };
    ConnectionStatus { state, last_checked: Some(Utc::now()), detail }
}

/// Probes the backend on a fixed period and publishes the result.
///
/// Workflow actions never wait on the monitor; it only drives the connection indicator.
#[derive(Debug)]
pub struct ConnectionMonitor {
    status: watch::Receiver<ConnectionStatus>,
    task: ScheduledTask,
}

impl ConnectionMonitor {
    pub fn start(probe: Arc<dyn HealthProbe>, interval: Duration, timeout: Duration) -> Self {
        let (sender, status) = watch::channel(ConnectionStatus::checking());
        let sender = Arc::new(sender);
        let latest = Arc::new(LatestWins::<ConnectionState>::new());

        let task = ScheduledTask::every("connectivity", interval, move || {
            let probe = Arc::clone(&probe);
            let sender = Arc::clone(&sender);
            let latest = Arc::clone(&latest);
            let ticket = latest.issue();
            async move {
                let checked = check_once(probe.as_ref(), timeout).await;
                if !latest.offer(ticket, checked.state) {
                    return;
                }
                let previous = sender.send_replace(checked.clone());
                if previous.state != checked.state {
                    log_change(previous.state, &checked);
                }
            }
        });

        Self { status, task }
    }

    pub fn from_config(probe: Arc<dyn HealthProbe>, config: &ConnectivityConfig) -> Self {
        Self::start(
            probe,
            Duration::from_secs(config.interval_secs),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn current(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn stop(&mut self) {
        self.task.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_active()
    }
}

fn log_change(previous: ConnectionState, current: &ConnectionStatus) {
    match current.state {
        ConnectionState::Connected => info!(
            event_name = "connectivity.state_changed",
            from = previous.as_str(),
            to = current.state.as_str(),
            "backend reachable"
        ),
        _ => warn!(
            event_name = "connectivity.state_changed",
            from = previous.as_str(),
            to = current.state.as_str(),
            detail = current.detail.as_deref().unwrap_or(""),
            "backend unavailable"
        ),
    }
}

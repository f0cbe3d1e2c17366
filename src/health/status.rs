//! The `/status` report.

use std::time::Duration;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::lifecycle::Services;
use crate::resilience::BreakerStatus;

const STORE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHealth {
    pub name: String,
    pub initialized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: HealthLevel,
    pub version: &'static str,
    pub breakers: Vec<BreakerStatus>,
    pub store: StoreHealth,
    pub queues: Vec<QueueHealth>,
}

impl StatusReport {
    pub async fn collect(services: &Services) -> Self {
        let store = match tokio::time::timeout(STORE_PROBE_TIMEOUT, services.store.ping()).await {
            Ok(Ok(())) => StoreHealth {
                reachable: true,
                error: None,
            },
            Ok(Err(e)) => StoreHealth {
                reachable: false,
                error: Some(e.to_string()),
            },
            Err(_) => StoreHealth {
                reachable: false,
                error: Some(format!("no answer within {STORE_PROBE_TIMEOUT:?}")),
            },
        };

        let breakers = services.breakers.snapshot();
        let queues = services
            .dispatcher
            .queues()
            .map(|q| QueueHealth {
                name: q.name().to_string(),
                initialized: q.is_initialized(),
            })
            .collect();

        let status = if store.reachable && !services.breakers.any_open() {
            HealthLevel::Ok
        } else {
            HealthLevel::Degraded
        };

        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            breakers,
            store,
            queues,
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport::collect(&state.services).await)
}

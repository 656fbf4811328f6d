use serde::Serialize;
use utoipa::ToSchema;

/// Overall health reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// The durable store did not answer; requests will fail until it recovers.
    Degraded,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Crate version of the running server.
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self::with_status(HealthStatus::Ok)
    }

    pub fn degraded() -> Self {
        Self::with_status(HealthStatus::Degraded)
    }

    fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

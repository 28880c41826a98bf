use serde::{Deserialize, Serialize};

use super::ConfigError;

/// `[observability]`: optional OTLP span export for `parley chat`.
///
/// One-shot commands (`run`, `history`, ...) always log compactly to
/// stderr and never export, whatever is set here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`. Unset or blank
    /// keeps chat on local JSON logs only.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "d_service_name")]
    pub service_name: String,
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl ObservabilityConfig {
    /// The collector to export to, if export is on.
    pub fn export_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Ratio handed to the trace-id sampler, clamped into `0.0..=1.0`.
    pub fn sampler_ratio(&self) -> f64 {
        if self.sample_rate.is_nan() {
            return d_sample_rate();
        }
        self.sample_rate.clamp(0.0, 1.0)
    }

    pub(super) fn issues(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();
        if let Some(endpoint) = self.export_endpoint() {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                issues.push(ConfigError::warning(
                    "observability.otlp_endpoint",
                    "expected an http:// or https:// URL, chat will start without export",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            issues.push(ConfigError::warning(
                "observability.sample_rate",
                "sample_rate outside 0.0..=1.0 will be clamped",
            ));
        }
        if self.service_name.trim().is_empty() {
            issues.push(ConfigError::warning(
                "observability.service_name",
                "empty service name, spans will be hard to find in the collector",
            ));
        }
        issues
    }
}

fn d_service_name() -> String {
    "parley".into()
}
fn d_sample_rate() -> f64 {
    1.0
}

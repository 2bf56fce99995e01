//! Tracing subscriber setup.
//!
//! Configuration for where and how structured logs are emitted. Library
//! crates only carry `tracing` call sites; the consuming binary calls
//! [`init_tracing`] once at startup.

use medalflow_error::{FlowResult, configuration_error};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Configuration for tracing output.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    /// Name of the package emitting the telemetry, e.g. `medalflow-runner`.
    pub package: &'static str,
    /// Maximum verbosity (inverse of log level).
    pub max_log_verbosity: tracing::level_filters::LevelFilter,
    /// Emit line-delimited JSON instead of the human format.
    pub json_output: bool,
    /// Invocation id recorded on every event for trace correlation.
    pub invocation_id: Uuid,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            package: "medalflow",
            max_log_verbosity: if cfg!(debug_assertions) {
                tracing::level_filters::LevelFilter::DEBUG
            } else {
                tracing::level_filters::LevelFilter::INFO
            },
            json_output: false,
            invocation_id: Uuid::new_v4(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// default verbosity. Fails if a subscriber is already installed.
pub fn init_tracing(config: &TraceConfig) -> FlowResult<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.max_log_verbosity.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_output {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| {
        configuration_error(
            format!(
                "failed to install tracing subscriber for {}: {e}",
                config.package
            ),
            Some("tracing"),
        )
    })
}

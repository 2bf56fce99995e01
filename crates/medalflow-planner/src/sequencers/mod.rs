//! Layer sequencers: the discovery side of planning.
//!
//! A sequencer produces the operations of one medallion layer. Discovery
//! is registration-based: transformation sequencers hold a registry of
//! named query producers, each paired with its declared [`QueryMetadata`];
//! discovery runs every producer exactly once and packages the returned
//! SQL into a validated operation. Discovery never executes SQL.

pub mod bronze;
pub mod gold;
pub mod silver;
pub mod snapshot;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use medalflow_common::constants::Layer;
use medalflow_error::{ErrorCode, FlowError, FlowResult};
use medalflow_schemas::operations::Operation;
use medalflow_schemas::{OperationBuilder, QueryMetadata};

pub use bronze::{BronzeSequencer, LakeDatabase};
pub use gold::GoldSequencer;
pub use silver::SilverTransformationSequencer;
pub use snapshot::SnapshotSequencer;

/// Anything that can produce the operations of one layer run.
pub trait Sequencer {
    /// Unique object name, used as the key for per-sequencer metadata.
    fn name(&self) -> String;

    fn layer(&self) -> Layer;

    /// Class-level metadata bag recorded on combined plans.
    fn class_metadata(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    /// Produce this sequencer's operations, in declaration order.
    fn queries(&self) -> FlowResult<Vec<Operation>>;
}

type QueryProducer = Box<dyn Fn() -> FlowResult<Option<String>> + Send + Sync>;

/// A named query producer with its declared metadata.
struct RegisteredQuery {
    method: String,
    metadata: QueryMetadata,
    producer: QueryProducer,
}

/// A discovered query: the producer ran and returned SQL.
#[derive(Debug)]
pub struct DiscoveredQuery {
    pub method: String,
    pub metadata: QueryMetadata,
    pub sql: String,
}

/// Registration-based replacement for decorator reflection: a sequencer
/// enumerates its operation-producing methods into the registry at
/// construction time.
#[derive(Default)]
pub struct TransformationRegistry {
    entries: Vec<RegisteredQuery>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, method: &str, metadata: QueryMetadata, producer: F)
    where
        F: Fn() -> FlowResult<Option<String>> + Send + Sync + 'static,
    {
        self.entries.push(RegisteredQuery {
            method: method.to_string(),
            metadata,
            producer: Box::new(producer),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every producer once. `Ok(None)` (or blank SQL) skips the method;
    /// an error aborts discovery with the sequencer, method, and cause.
    pub fn discover(&self, sequencer_name: &str) -> FlowResult<Vec<DiscoveredQuery>> {
        let mut discovered = Vec::with_capacity(self.entries.len());
        let mut skipped = Vec::new();

        for entry in &self.entries {
            let result = (entry.producer)().map_err(|e| {
                FlowError::new(
                    ErrorCode::LayerProcessingError,
                    format!(
                        "method '{}' in {sequencer_name} failed during discovery",
                        entry.method
                    ),
                )
                .with_detail("sequencer", sequencer_name)
                .with_detail("method", &entry.method)
                .with_cause("FlowError", e.to_string())
            })?;

            match result {
                Some(sql) if !sql.trim().is_empty() => discovered.push(DiscoveredQuery {
                    method: entry.method.clone(),
                    metadata: entry.metadata.clone(),
                    sql,
                }),
                _ => {
                    info!(
                        method = %entry.method,
                        sequencer = sequencer_name,
                        "method skipped, no SQL produced"
                    );
                    skipped.push(entry.method.clone());
                }
            }
        }

        if !skipped.is_empty() {
            info!(
                sequencer = sequencer_name,
                discovered_count = discovered.len(),
                skipped_count = skipped.len(),
                "discovery complete"
            );
        }
        Ok(discovered)
    }
}

/// Package discovered queries into operations, attaching the standard
/// logging context (method, class, sequencer object name, layer).
pub(crate) fn operations_from_discovered(
    discovered: Vec<DiscoveredQuery>,
    sequencer_name: &str,
    layer: Layer,
) -> FlowResult<Vec<Operation>> {
    let mut operations = Vec::with_capacity(discovered.len());
    for query in discovered {
        let logging_context: BTreeMap<String, String> = [
            ("method".to_string(), query.method.clone()),
            ("class".to_string(), sequencer_name.to_string()),
            ("name".to_string(), sequencer_name.to_string()),
            ("layer".to_string(), layer.to_string()),
        ]
        .into();

        let engine_hint = query.metadata.preferred_engine;
        let operation = OperationBuilder::from_discovered_sql(
            &query.metadata,
            &query.sql,
            engine_hint,
            logging_context,
        )
        .map_err(|e| {
            e.with_detail("sequencer", sequencer_name)
                .with_detail("method", &query.method)
        })?;
        operations.push(operation);
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medalflow_schemas::operations::QueryType;

    #[test]
    fn discovery_runs_producers_once_and_skips_none() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut registry = TransformationRegistry::new();
        registry.register(
            "load_orders",
            QueryMetadata::new(QueryType::Insert, "silver", "orders"),
            || {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Some("SELECT * FROM bronze.orders".to_string()))
            },
        );
        registry.register(
            "disabled_feature",
            QueryMetadata::new(QueryType::Insert, "silver", "unused"),
            || Ok(None),
        );
        registry.register(
            "blank_sql",
            QueryMetadata::new(QueryType::Insert, "silver", "blank"),
            || Ok(Some("   ".to_string())),
        );

        let discovered = registry.discover("OrdersSilver").unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].method, "load_orders");
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn producer_errors_surface_class_method_and_cause() {
        let mut registry = TransformationRegistry::new();
        registry.register(
            "broken",
            QueryMetadata::new(QueryType::Insert, "silver", "t"),
            || {
                Err(FlowError::new(
                    ErrorCode::ConfigMissing,
                    "missing watermark setting",
                ))
            },
        );

        let err = registry.discover("BrokenSilver").unwrap_err();
        assert_eq!(err.code(), ErrorCode::LayerProcessingError);
        assert_eq!(err.details()["sequencer"], "BrokenSilver");
        assert_eq!(err.details()["method"], "broken");
        assert!(err.to_string().contains("missing watermark setting"));
    }

    #[test]
    fn discovered_queries_become_operations_with_logging_context() {
        let discovered = vec![DiscoveredQuery {
            method: "load_orders".to_string(),
            metadata: QueryMetadata::new(QueryType::Insert, "silver", "orders"),
            sql: "SELECT * FROM bronze.orders".to_string(),
        }];
        let operations =
            operations_from_discovered(discovered, "OrdersSilver", Layer::Silver).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].logging_context["method"], "load_orders");
        assert_eq!(operations[0].logging_context["layer"], "silver");
        assert_eq!(operations[0].operation_type(), QueryType::Insert);
    }
}

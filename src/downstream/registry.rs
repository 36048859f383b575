//! Pipeline registry keyed by downstream name.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ClientConfig, DownstreamConfig};
use crate::resilience::{BreakerSnapshot, ObserverSet, Pipeline, PolicyObserver, TracingObserver};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("downstream '{name}' has an invalid base_url: {source}")]
    InvalidBaseUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
}

/// Breaker report for one downstream.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamStatus {
    pub name: String,
    pub circuit: Option<BreakerSnapshot>,
}

/// Owns the pipelines for every configured downstream.
#[derive(Default)]
pub struct DownstreamRegistry {
    pipelines: DashMap<String, Arc<Pipeline>>,
}

impl DownstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build pipelines over HTTP transports for every downstream in `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, RegistryError> {
        Self::from_config_with_observer(config, None)
    }

    /// Like `from_config`, with `extra` notified next to the logging observer.
    pub fn from_config_with_observer(
        config: &ClientConfig,
        extra: Option<Arc<dyn PolicyObserver>>,
    ) -> Result<Self, RegistryError> {
        let observer: Arc<dyn PolicyObserver> = match extra {
            Some(extra) => Arc::new(ObserverSet::new().with(Arc::new(TracingObserver)).with(extra)),
            None => Arc::new(TracingObserver),
        };
        let registry = Self::new();

        for downstream in &config.downstreams {
            let base_url = Url::parse(&downstream.base_url).map_err(|source| RegistryError::InvalidBaseUrl {
                name: downstream.name.clone(),
                source,
            })?;
            let transport = HttpTransport::new(base_url).with_max_body_bytes(downstream.max_body_bytes);
            registry.insert(build_pipeline(downstream, Arc::new(transport), observer.clone()));
        }

        tracing::info!(downstreams = registry.len(), "Downstream registry ready");
        Ok(registry)
    }

    /// Register a pipeline, replacing any previous one with the same name.
    pub fn insert(&self, pipeline: Pipeline) {
        let name = pipeline.name().to_string();
        if self.pipelines.insert(name.clone(), Arc::new(pipeline)).is_some() {
            tracing::warn!(downstream = %name, "Replaced existing pipeline; breaker state reset");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Breaker state for every downstream, sorted by name.
    pub fn snapshot(&self) -> Vec<DownstreamStatus> {
        let mut statuses: Vec<_> = self
            .pipelines
            .iter()
            .map(|entry| DownstreamStatus {
                name: entry.key().clone(),
                circuit: entry.value().snapshot(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

/// Assemble the pipeline described by `config` over `transport`.
pub fn build_pipeline(
    config: &DownstreamConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn PolicyObserver>,
) -> Pipeline {
    let mut builder = Pipeline::builder(config.name.clone(), transport)
        .classifier(config.classification.to_classifier())
        .retry(config.retry.to_policy())
        .observer(observer);

    if let Some(breaker) = &config.circuit_breaker {
        builder = builder.circuit_breaker(breaker.to_policy());
    }
    if let Some(timeout) = config.timeouts.attempt_timeout() {
        builder = builder.attempt_timeout(timeout);
    }

    builder.build()
}

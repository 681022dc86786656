use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use axum::Router;

use crate::{
    api, config::Config, observability::Telemetry, pipeline::ClassificationPipeline,
};

/// Shared handler state. The pipeline sits behind a read/write lock: predict
/// takes a read guard, fit/update a write guard, so reads stay concurrent
/// while writes are serialized.
#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    pipeline: Arc<RwLock<ClassificationPipeline>>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn pipeline(&self) -> Arc<RwLock<ClassificationPipeline>> {
        Arc::clone(&self.registry.pipeline)
    }
}

impl ComponentRegistry {
    /// Initializes telemetry and builds the configured pipeline, owned by the
    /// registry for the life of the process.
    ///
    /// # Errors
    /// Fails when telemetry initialization or pipeline construction fails.
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new().context("failed to initialize telemetry")?;
        let pipeline = ClassificationPipeline::from_config(&config)
            .context("failed to build classification pipeline")?;

        Ok(Self {
            config,
            telemetry,
            pipeline: Arc::new(RwLock::new(pipeline)),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

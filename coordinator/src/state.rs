use std::sync::Arc;

use anyhow::Result;

use crate::collaborators::NarrativeGenerator;
use crate::launcher::PipelineLauncher;
use crate::narrative::HttpNarrator;
use crate::pipeline::{Coordinator, PipelineOptions};
use crate::registry::TaskRegistry;
use crate::services::builtin_collaborators;
use crate::settings::Settings;
use crate::store::{MemoryStore, Storage};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub launcher: PipelineLauncher,
    pub registry: TaskRegistry,
}

impl AppState {
    /// Arma el coordinador con almacenamiento en memoria y los servicios incluidos.
    pub fn new(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let narrator: Arc<dyn NarrativeGenerator> = Arc::new(HttpNarrator::new(settings.narrator.clone())?);
        let collaborators = builtin_collaborators(store.clone(), narrator, settings.forecast_periods);

        let coordinator = Arc::new(Coordinator::new(
            store,
            collaborators,
            PipelineOptions {
                row_limit: settings.row_limit,
                sample_rows: settings.sample_rows,
            },
        ));

        let registry = TaskRegistry::new();
        let launcher = PipelineLauncher::new(coordinator.clone(), registry.clone(), settings.pipeline_concurrency);

        Ok(Self {
            coordinator,
            launcher,
            registry,
        })
    }
}

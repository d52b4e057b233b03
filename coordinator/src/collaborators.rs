use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use common::reports::NarrativeSource;
use common::{AnalysisTask, ColumnClassification, DatasetInfo, FeatureEngineeringConfig, Record};

/// Todo lo que un servicio de etapa necesita de la corrida actual.
/// `config` es la última versión leída justo antes del paso.
pub struct StageContext<'a> {
    pub task: &'a AnalysisTask,
    pub dataset: &'a DatasetInfo,
    pub config: &'a FeatureEngineeringConfig,
    pub records: &'a [Record],
}

/// Clasifica columnas para un objetivo. Puede ser lento y puede fallar;
/// el coordinador no reintenta.
#[async_trait]
pub trait ColumnClassifier: Send + Sync {
    async fn classify(
        &self,
        target: &str,
        columns: &[String],
        sample: &[Record],
    ) -> Result<ColumnClassification>;
}

#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub topic: String,
    pub prompt: String,
}

/// Genera texto libre a partir de un resumen estructurado.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn explain(&self, request: &NarrativeRequest) -> Result<String>;
}

/// Devuelve el id del artefacto de estadísticas.
#[async_trait]
pub trait StatisticsService: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String>;
}

/// Devuelve los ids de los gráficos generados.
#[async_trait]
pub trait VisualizationService: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<Vec<String>>;
}

/// Devuelve el id del artefacto de predicción.
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String>;
}

/// Devuelve el id del artefacto de solución.
#[async_trait]
pub trait SolutionService: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn ColumnClassifier>,
    pub statistics: Arc<dyn StatisticsService>,
    pub visualization: Arc<dyn VisualizationService>,
    pub prediction: Arc<dyn PredictionService>,
    pub solution: Arc<dyn SolutionService>,
}

/// Texto del generador o, si falla, la plantilla. Nunca propaga el error.
pub async fn narrate_or_template(
    narrator: &dyn NarrativeGenerator,
    request: &NarrativeRequest,
    template: impl FnOnce() -> String,
) -> (String, NarrativeSource) {
    match narrator.explain(request).await {
        Ok(text) if !text.trim().is_empty() => (text, NarrativeSource::Generator),
        Ok(_) => {
            warn!("narrativa vacía para '{}', se usa plantilla", request.topic);
            (template(), NarrativeSource::Template)
        }
        Err(e) => {
            warn!("falló la narrativa de '{}': {:#}, se usa plantilla", request.topic, e);
            (template(), NarrativeSource::Template)
        }
    }
}

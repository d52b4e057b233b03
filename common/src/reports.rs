use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::correlation::CorrelationResult;
use crate::{ArtifactId, DatasetId, TaskId};

/* =========================
   Estadística descriptiva
   ========================= */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    pub median: f64,
    /// Desvío muestral (n-1); 0 con menos de dos valores.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub target_column: String,
    pub group_by_column: Option<String>,
    pub overall: Summary,
    pub by_group: BTreeMap<String, Summary>,
    pub explanation: String,
}

/* =========================
   Gráficos (sólo especificación)
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<ChartSeries>,
}

/* =========================
   Predicción
   ========================= */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupForecast {
    pub group: String,
    pub last_period: Option<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub target_column: String,
    pub model: String,
    pub horizon: usize,
    pub metrics: ModelMetrics,
    pub forecasts: Vec<GroupForecast>,
}

/* =========================
   Solución / narrativa
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Generator,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionReport {
    pub target_column: String,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_text: String,
    pub source: NarrativeSource,
}

/* =========================
   Artefactos guardados
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    Statistics(StatisticsReport),
    Chart(ChartSpec),
    Correlation(CorrelationResult),
    Prediction(PredictionReport),
    Solution(SolutionReport),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Statistics(_) => "statistics",
            Artifact::Chart(_) => "chart",
            Artifact::Correlation(_) => "correlation",
            Artifact::Prediction(_) => "prediction",
            Artifact::Solution(_) => "solution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub artifact_id: ArtifactId,
    pub dataset_id: DatasetId,
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub artifact: Artifact,
}

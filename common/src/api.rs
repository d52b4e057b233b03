use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::table::Records;
use crate::task::{Status, Step, StepResult};
use crate::{DatasetId, OwnerId, TaskId};

/* --------- Datasets --------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_id: DatasetId,
    pub owner_id: OwnerId,
    pub name: String,
    pub columns: Vec<String>,
    pub target_column: Option<String>,
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDatasetRequest {
    pub owner_id: OwnerId,
    pub name: String,
    pub target_column: Option<String>,
    pub rows: Records,
}

/* --------- Análisis --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAnalysisRequest {
    pub dataset_id: DatasetId,
    pub owner_id: OwnerId,
    /// Si falta se usa el objetivo registrado en el dataset.
    pub target_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAnalysisResponse {
    pub task_id: TaskId,
    pub status: Status,
}

/// Resultado de todos los pasos; sólo existe cuando la tarea está completa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultView {
    pub task_id: TaskId,
    pub dataset_id: DatasetId,
    pub target_column: String,
    pub results: BTreeMap<Step, StepResult>,
}

/* --------- Registro de ejecuciones --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningTaskInfo {
    pub task_id: TaskId,
    pub dataset_id: DatasetId,
    pub started_at: DateTime<Utc>,
    pub finished: bool,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningTasksSnapshot {
    pub count: usize,
    pub tasks: Vec<RunningTaskInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelReport {
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub removed: usize,
    pub remaining: usize,
}

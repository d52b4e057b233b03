use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::correlation::analyze;
use common::features::{find_date_column, generate_rolling_features, ROLLING_SUFFIX};
use common::table::{column_names, has_column};
use common::{
    primary_group_column, AnalysisTask, Artifact, CorrelationResult, DatasetInfo,
    FeatureEngineeringConfig, Records, RollingFeatureRequest, Status, Step, StepResult,
    StoredArtifact, TaskResultView, UploadDatasetRequest, StartAnalysisRequest,
};

use crate::collaborators::{Collaborators, StageContext};
use crate::error::PipelineError;
use crate::store::Storage;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Filas cargadas por dataset.
    pub row_limit: usize,
    /// Muestra que recibe el clasificador.
    pub sample_rows: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            row_limit: 10_000,
            sample_rows: 20,
        }
    }
}

/// Máquina de estados del pipeline: corre los seis pasos en orden y
/// persiste cada transición antes de seguir.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn Storage>,
    collaborators: Collaborators,
    options: PipelineOptions,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Storage>, collaborators: Collaborators, options: PipelineOptions) -> Self {
        Self {
            store,
            collaborators,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /* =========================
       Datasets y tareas
       ========================= */

    pub async fn register_dataset(&self, req: UploadDatasetRequest) -> Result<DatasetInfo, PipelineError> {
        if req.rows.is_empty() {
            return Err(PipelineError::InvalidInput("el dataset no tiene filas".into()));
        }
        let columns = column_names(&req.rows);
        if let Some(target) = &req.target_column {
            if !columns.contains(target) {
                return Err(PipelineError::InvalidInput(format!(
                    "la columna objetivo '{}' no existe",
                    target
                )));
            }
        }

        let info = DatasetInfo {
            dataset_id: uuid::Uuid::new_v4().to_string(),
            owner_id: req.owner_id,
            name: req.name,
            columns,
            target_column: req.target_column,
            row_count: req.rows.len() as u64,
            created_at: Utc::now(),
        };
        self.store.save_dataset(info.clone(), req.rows).await?;
        info!("dataset {} registrado ({} filas)", info.dataset_id, info.row_count);
        Ok(info)
    }

    pub async fn dataset(&self, dataset_id: &str) -> Result<DatasetInfo, PipelineError> {
        self.store
            .get_dataset(dataset_id)
            .await?
            .ok_or_else(|| PipelineError::DatasetNotFound(dataset_id.to_string()))
    }

    /// Crea la tarea en estado pending. No la ejecuta.
    pub async fn create_task(&self, req: &StartAnalysisRequest) -> Result<AnalysisTask, PipelineError> {
        let dataset = self.dataset(&req.dataset_id).await?;
        if dataset.owner_id != req.owner_id {
            return Err(PipelineError::Forbidden);
        }

        let target = req
            .target_column
            .clone()
            .or_else(|| dataset.target_column.clone())
            .ok_or_else(|| PipelineError::InvalidInput("falta la columna objetivo".into()))?;
        if !dataset.columns.contains(&target) {
            return Err(PipelineError::InvalidInput(format!(
                "la columna objetivo '{}' no existe",
                target
            )));
        }

        let task = self
            .store
            .create_task(&dataset.dataset_id, &req.owner_id, &target)
            .await?;
        info!("tarea {} creada para dataset {}", task.task_id, dataset.dataset_id);
        Ok(task)
    }

    /* =========================
       Ejecución
       ========================= */

    /// Corre la tarea hasta terminar o fallar. La cancelación se observa después
    /// de persistir el inicio de cada paso y después de que el paso devuelve.
    /// Los errores de un paso quedan en la tarea; sólo los de almacenamiento
    /// se devuelven.
    pub async fn run(&self, task_id: &str, cancel: &CancellationToken) -> Result<Status> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("tarea {} no encontrada", task_id))?;
        if task.status.is_terminal() {
            debug!("tarea {} ya está {}", task_id, task.status);
            return Ok(task.status);
        }

        for step in Step::ALL {
            if task.step_status(step) == Status::Completed {
                continue;
            }

            self.store
                .update_step(task_id, step, Status::Processing, None, None)
                .await
                .with_context(|| format!("iniciando paso {}", step))?;
            info!("tarea {}: paso {} en curso", task_id, step);

            if cancel.is_cancelled() {
                return self.fail(task_id, step, "ejecución cancelada".to_string()).await;
            }

            // un pánico del colaborador también deja el paso fallido
            let outcome = match AssertUnwindSafe(self.execute(task_id, step)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(anyhow!("el paso {} entró en pánico: {}", step, panic_message(&*panic))),
            };

            if cancel.is_cancelled() {
                return self.fail(task_id, step, "ejecución cancelada".to_string()).await;
            }

            match outcome {
                Ok(result) => {
                    self.store
                        .update_step(task_id, step, Status::Completed, Some(result), None)
                        .await
                        .with_context(|| format!("completando paso {}", step))?;
                    info!("tarea {}: paso {} completo", task_id, step);
                }
                Err(e) => {
                    error!("tarea {}: paso {} falló: {:#}", task_id, step, e);
                    return self.fail(task_id, step, format!("{e:?}")).await;
                }
            }
        }

        info!("tarea {} completa", task_id);
        Ok(Status::Completed)
    }

    async fn fail(&self, task_id: &str, step: Step, error: String) -> Result<Status> {
        self.store
            .update_step(task_id, step, Status::Failed, None, Some(error))
            .await
            .with_context(|| format!("marcando paso {} como fallido", step))?;
        warn!("tarea {} detenida en el paso {}", task_id, step);
        Ok(Status::Failed)
    }

    /// Trabajo de un paso. Todo se vuelve a leer: tarea, dataset, filas y
    /// la última configuración.
    async fn execute(&self, task_id: &str, step: Step) -> Result<StepResult> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("tarea {} no encontrada", task_id))?;
        let dataset = self
            .store
            .get_dataset(&task.dataset_id)
            .await?
            .ok_or_else(|| anyhow!("dataset {} no encontrado", task.dataset_id))?;
        let rows = Arc::new(
            self.store
                .get_rows(&dataset.dataset_id, 0, self.options.row_limit)
                .await?,
        );
        if rows.is_empty() {
            bail!("el dataset {} no tiene filas", dataset.dataset_id);
        }

        let config = self.ensure_config(&dataset, &task.target_column, &rows).await?;

        let ctx = StageContext {
            task: &task,
            dataset: &dataset,
            config: &config,
            records: rows.as_slice(),
        };

        let result = match step {
            Step::RelatedColumns => StepResult::RelatedColumns {
                final_columns: config.final_columns(),
            },
            Step::Statistics => StepResult::Statistics {
                statistics_id: self.collaborators.statistics.run(&ctx).await?,
            },
            Step::Visualizations => StepResult::Visualizations {
                visualization_ids: self.collaborators.visualization.run(&ctx).await?,
            },
            Step::Correlation => StepResult::Correlation {
                correlation_id: self.correlation_step(&task, rows.clone(), config.clone()).await?,
            },
            Step::Prediction => StepResult::Prediction {
                prediction_id: self.collaborators.prediction.run(&ctx).await?,
            },
            Step::Solution => StepResult::Solution {
                solution_id: self.collaborators.solution.run(&ctx).await?,
            },
        };
        Ok(result)
    }

    /* =========================
       Configuración de features
       ========================= */

    /// Devuelve la configuración guardada o la regenera: clasificador,
    /// columna de fecha, features rolling y grupo principal.
    pub async fn ensure_config(
        &self,
        dataset: &DatasetInfo,
        target: &str,
        rows: &Arc<Records>,
    ) -> Result<FeatureEngineeringConfig> {
        if let Some(config) = self.store.get_config(&dataset.dataset_id, target).await? {
            return Ok(config);
        }

        info!("sin configuración para ({}, {}), se regenera", dataset.dataset_id, target);

        let columns = if dataset.columns.is_empty() {
            column_names(rows)
        } else {
            dataset.columns.clone()
        };
        let sample = &rows[..rows.len().min(self.options.sample_rows)];

        let classification = self
            .collaborators
            .classifier
            .classify(target, &columns, sample)
            .await
            .context("clasificando columnas")?;

        let mut config =
            FeatureEngineeringConfig::from_classification(dataset.dataset_id.clone(), target, classification);
        if config.date_column.is_none() {
            config.date_column = find_date_column(&columns, sample);
        }

        match config.date_column.clone() {
            Some(date_column) => {
                let req = RollingFeatureRequest {
                    date_column,
                    target_column: target.to_string(),
                    source_columns: config.feature_columns(),
                    group_by_columns: config.grouping_columns.clone(),
                };
                let data = rows.clone();
                let generated = tokio::task::spawn_blocking(move || generate_rolling_features(&data, &req))
                    .await
                    .context("tarea de features rolling")?;
                match generated {
                    Ok((_, names)) => config.add_lag_features(&names),
                    Err(e) => warn!("no se generaron features rolling: {}", e),
                }
            }
            None => warn!("dataset {} sin columna de fecha, no hay features rolling", dataset.dataset_id),
        }

        let (group_by_column, group_counts) = primary_group_column(rows, &config.grouping_columns);
        config.group_by_column = group_by_column;
        config.group_counts = group_counts;
        config.updated_at = Utc::now();

        self.store
            .save_config(config.clone())
            .await
            .context("guardando configuración")?;
        Ok(config)
    }

    /* =========================
       Correlación (en línea)
       ========================= */

    async fn correlation_step(
        &self,
        task: &AnalysisTask,
        rows: Arc<Records>,
        config: FeatureEngineeringConfig,
    ) -> Result<String> {
        let result = tokio::task::spawn_blocking(move || correlate_with_lag_features(&rows, &config))
            .await
            .context("tarea de correlación")??;

        debug!(
            "tarea {}: {} features correlacionadas",
            task.task_id,
            result.overall.len()
        );

        self.store
            .save_artifact(&task.dataset_id, Some(&task.task_id), Artifact::Correlation(result))
            .await
            .context("guardando correlación")
    }

    /* =========================
       Consultas
       ========================= */

    pub async fn task_for_owner(&self, task_id: &str, owner_id: &str) -> Result<AnalysisTask, PipelineError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()))?;
        if task.owner_id != owner_id {
            return Err(PipelineError::Forbidden);
        }
        Ok(task)
    }

    pub async fn task_result(&self, task_id: &str, owner_id: &str) -> Result<TaskResultView, PipelineError> {
        let task = self.task_for_owner(task_id, owner_id).await?;
        if task.status != Status::Completed {
            return Err(PipelineError::NotCompleted(task.status));
        }

        let results: BTreeMap<Step, StepResult> = task
            .steps
            .iter()
            .filter_map(|(step, state)| state.result.clone().map(|r| (*step, r)))
            .collect();

        Ok(TaskResultView {
            task_id: task.task_id,
            dataset_id: task.dataset_id,
            target_column: task.target_column,
            results,
        })
    }

    pub async fn artifact(&self, artifact_id: &str) -> Result<StoredArtifact, PipelineError> {
        self.store
            .get_artifact(artifact_id)
            .await?
            .ok_or_else(|| PipelineError::ArtifactNotFound(artifact_id.to_string()))
    }

    pub async fn latest_completed_task(&self, dataset_id: &str) -> Result<Option<AnalysisTask>, PipelineError> {
        Ok(self.store.latest_completed_task(dataset_id).await?)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("pánico sin mensaje")
}

/// Regenera las features rolling que la configuración nombra pero que no
/// están en las filas, y calcula la correlación completa.
pub fn correlate_with_lag_features(
    records: &Records,
    config: &FeatureEngineeringConfig,
) -> Result<CorrelationResult> {
    let target = config.target_column.as_str();
    let mut features = config.feature_columns();

    let missing: Vec<String> = config
        .lag_feature_columns
        .iter()
        .filter(|c| !has_column(records, c))
        .cloned()
        .collect();

    let mut regenerated: Option<Records> = None;
    if !missing.is_empty() {
        let sources: Vec<String> = missing
            .iter()
            .filter_map(|c| c.strip_suffix(ROLLING_SUFFIX).map(str::to_string))
            .collect();

        let outcome = match &config.date_column {
            Some(date_column) => generate_rolling_features(
                records,
                &RollingFeatureRequest {
                    date_column: date_column.clone(),
                    target_column: target.to_string(),
                    source_columns: sources,
                    group_by_columns: config.grouping_columns.clone(),
                },
            )
            .map_err(anyhow::Error::from),
            None => Err(anyhow!("la configuración no tiene columna de fecha")),
        };

        match outcome {
            Ok((with_lag, names)) => {
                debug!("{} features rolling regeneradas", names.len());
                regenerated = Some(with_lag);
            }
            Err(e) => {
                warn!("no se pudieron regenerar las features rolling: {:#}", e);
                features.retain(|f| !missing.contains(f));
            }
        }
    }

    let data = regenerated.as_deref().unwrap_or(records.as_slice());
    Ok(analyze(data, target, &features, &config.grouping_columns)?)
}

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use common::{
    AnalysisTask, Artifact, ArtifactId, DatasetInfo, FeatureEngineeringConfig, Records, Status,
    Step, StepResult, StoredArtifact, TaskId,
};

/// Almacenamiento de datasets, configuraciones, tareas y artefactos.
/// Las operaciones son lectura-modificación-escritura sin versión.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_dataset(&self, info: DatasetInfo, rows: Records) -> Result<()>;
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>>;
    async fn get_rows(&self, dataset_id: &str, offset: usize, limit: usize) -> Result<Records>;

    async fn get_config(
        &self,
        dataset_id: &str,
        target: &str,
    ) -> Result<Option<FeatureEngineeringConfig>>;
    async fn save_config(&self, config: FeatureEngineeringConfig) -> Result<()>;

    async fn create_task(
        &self,
        dataset_id: &str,
        owner_id: &str,
        target: &str,
    ) -> Result<AnalysisTask>;
    async fn update_step(
        &self,
        task_id: &str,
        step: Step,
        status: Status,
        result: Option<StepResult>,
        error: Option<String>,
    ) -> Result<AnalysisTask>;
    async fn update_task_status(&self, task_id: &str, status: Status) -> Result<AnalysisTask>;
    async fn get_task(&self, task_id: &str) -> Result<Option<AnalysisTask>>;
    async fn latest_completed_task(&self, dataset_id: &str) -> Result<Option<AnalysisTask>>;

    async fn save_artifact(
        &self,
        dataset_id: &str,
        task_id: Option<&str>,
        artifact: Artifact,
    ) -> Result<ArtifactId>;
    async fn get_artifact(&self, artifact_id: &str) -> Result<Option<StoredArtifact>>;
}

/* =========================
   Implementación en memoria
   ========================= */

#[derive(Default)]
pub struct MemoryStore {
    datasets: Mutex<HashMap<String, (DatasetInfo, Records)>>,
    configs: Mutex<HashMap<(String, String), FeatureEngineeringConfig>>,
    tasks: Mutex<HashMap<TaskId, AnalysisTask>>,
    artifacts: Mutex<HashMap<ArtifactId, StoredArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_task<F>(&self, task_id: &str, f: F) -> Result<AnalysisTask>
    where
        F: FnOnce(&mut AnalysisTask) -> Result<(), common::AnalysisError>,
    {
        let mut tasks = self.tasks.lock().map_err(|_| anyhow!("lock tasks"))?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("tarea {} no encontrada", task_id))?;

        // se trabaja sobre una copia para no dejar la tarea a medio modificar
        let mut updated = task.clone();
        f(&mut updated).with_context(|| format!("tarea {}", task_id))?;
        *task = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn save_dataset(&self, info: DatasetInfo, rows: Records) -> Result<()> {
        let mut datasets = self.datasets.lock().map_err(|_| anyhow!("lock datasets"))?;
        datasets.insert(info.dataset_id.clone(), (info, rows));
        Ok(())
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>> {
        let datasets = self.datasets.lock().map_err(|_| anyhow!("lock datasets"))?;
        Ok(datasets.get(dataset_id).map(|(info, _)| info.clone()))
    }

    async fn get_rows(&self, dataset_id: &str, offset: usize, limit: usize) -> Result<Records> {
        let datasets = self.datasets.lock().map_err(|_| anyhow!("lock datasets"))?;
        let (_, rows) = datasets
            .get(dataset_id)
            .ok_or_else(|| anyhow!("dataset {} no encontrado", dataset_id))?;
        Ok(rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_config(
        &self,
        dataset_id: &str,
        target: &str,
    ) -> Result<Option<FeatureEngineeringConfig>> {
        let configs = self.configs.lock().map_err(|_| anyhow!("lock configs"))?;
        Ok(configs
            .get(&(dataset_id.to_string(), target.to_string()))
            .cloned())
    }

    async fn save_config(&self, config: FeatureEngineeringConfig) -> Result<()> {
        let mut configs = self.configs.lock().map_err(|_| anyhow!("lock configs"))?;
        let key = (config.dataset_id.clone(), config.target_column.clone());
        configs.insert(key, config);
        Ok(())
    }

    async fn create_task(
        &self,
        dataset_id: &str,
        owner_id: &str,
        target: &str,
    ) -> Result<AnalysisTask> {
        let task = AnalysisTask::new(
            uuid::Uuid::new_v4().to_string(),
            dataset_id.to_string(),
            owner_id.to_string(),
            target.to_string(),
        );
        let mut tasks = self.tasks.lock().map_err(|_| anyhow!("lock tasks"))?;
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn update_step(
        &self,
        task_id: &str,
        step: Step,
        status: Status,
        result: Option<StepResult>,
        error: Option<String>,
    ) -> Result<AnalysisTask> {
        self.with_task(task_id, |t| t.apply(step, status, result, error))
    }

    async fn update_task_status(&self, task_id: &str, status: Status) -> Result<AnalysisTask> {
        self.with_task(task_id, |t| t.set_status(status))
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<AnalysisTask>> {
        let tasks = self.tasks.lock().map_err(|_| anyhow!("lock tasks"))?;
        Ok(tasks.get(task_id).cloned())
    }

    async fn latest_completed_task(&self, dataset_id: &str) -> Result<Option<AnalysisTask>> {
        let tasks = self.tasks.lock().map_err(|_| anyhow!("lock tasks"))?;
        Ok(tasks
            .values()
            .filter(|t| t.dataset_id == dataset_id && t.status == Status::Completed)
            .max_by_key(|t| t.updated_at)
            .cloned())
    }

    async fn save_artifact(
        &self,
        dataset_id: &str,
        task_id: Option<&str>,
        artifact: Artifact,
    ) -> Result<ArtifactId> {
        let artifact_id = uuid::Uuid::new_v4().to_string();
        let stored = StoredArtifact {
            artifact_id: artifact_id.clone(),
            dataset_id: dataset_id.to_string(),
            task_id: task_id.map(str::to_string),
            created_at: Utc::now(),
            artifact,
        };
        let mut artifacts = self.artifacts.lock().map_err(|_| anyhow!("lock artifacts"))?;
        artifacts.insert(artifact_id.clone(), stored);
        Ok(artifact_id)
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<Option<StoredArtifact>> {
        let artifacts = self.artifacts.lock().map_err(|_| anyhow!("lock artifacts"))?;
        Ok(artifacts.get(artifact_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_step_rechaza_transiciones_invalidas_sin_modificar() {
        let store = MemoryStore::new();
        let task = store.create_task("d1", "u1", "ventas").await.unwrap();

        let err = store
            .update_step(&task.task_id, Step::Solution, Status::Processing, None, None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("solution"));

        let same = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(same, task);
    }

    #[tokio::test]
    async fn update_step_persiste_el_avance() {
        let store = MemoryStore::new();
        let task = store.create_task("d1", "u1", "ventas").await.unwrap();

        let t = store
            .update_step(&task.task_id, Step::RelatedColumns, Status::Processing, None, None)
            .await
            .unwrap();
        assert_eq!(t.current_step, Some(Step::RelatedColumns));

        let t = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(t.status, Status::Processing);
    }

    #[tokio::test]
    async fn update_task_status_rechaza_estados_incoherentes() {
        let store = MemoryStore::new();
        let task = store.create_task("d1", "u1", "ventas").await.unwrap();

        // sin pasos completos ni fallidos
        let err = store
            .update_task_status(&task.task_id, Status::Completed)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("no es coherente"));
        assert!(store.update_task_status(&task.task_id, Status::Failed).await.is_err());
        assert_eq!(store.get_task(&task.task_id).await.unwrap().unwrap(), task);

        let t = store
            .update_task_status(&task.task_id, Status::Processing)
            .await
            .unwrap();
        assert_eq!(t.status, Status::Processing);
        assert!(store.update_task_status("nada", Status::Processing).await.is_err());
    }

    #[tokio::test]
    async fn get_rows_pagina_con_offset_y_limite() {
        let store = MemoryStore::new();
        let rows: Records = (0..5)
            .map(|i| {
                let mut r = common::Record::new();
                r.insert("i".into(), serde_json::json!(i));
                r
            })
            .collect();
        let info = DatasetInfo {
            dataset_id: "d1".into(),
            owner_id: "u1".into(),
            name: "ventas.csv".into(),
            columns: vec!["i".into()],
            target_column: None,
            row_count: 5,
            created_at: Utc::now(),
        };
        store.save_dataset(info, rows).await.unwrap();

        let page = store.get_rows("d1", 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["i"], 1);
        assert!(store.get_rows("nada", 0, 10).await.is_err());
    }
}

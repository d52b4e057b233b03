use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::{AnalysisTask, StartAnalysisRequest};

use crate::error::PipelineError;
use crate::pipeline::Coordinator;
use crate::registry::TaskRegistry;

/// Lanza corridas del pipeline en segundo plano, con un máximo de
/// `concurrency` ejecutando a la vez. Las demás esperan permiso.
#[derive(Clone)]
pub struct PipelineLauncher {
    coordinator: Arc<Coordinator>,
    registry: TaskRegistry,
    permits: Arc<Semaphore>,
}

impl PipelineLauncher {
    pub fn new(coordinator: Arc<Coordinator>, registry: TaskRegistry, concurrency: usize) -> Self {
        Self {
            coordinator,
            registry,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Crea la tarea y vuelve enseguida; la corrida sigue en segundo plano.
    pub async fn start(&self, req: StartAnalysisRequest) -> Result<AnalysisTask, PipelineError> {
        let task = self.coordinator.create_task(&req).await?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let coordinator = self.coordinator.clone();
        let permits = self.permits.clone();
        let task_id = task.task_id.clone();

        self.registry.spawn(
            task.task_id.clone(),
            task.dataset_id.clone(),
            cancel,
            async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        warn!("semáforo cerrado, tarea {} no se ejecuta", task_id);
                        return;
                    }
                };

                match coordinator.run(&task_id, &token).await {
                    Ok(status) => info!("tarea {} terminó: {}", task_id, status),
                    Err(e) => warn!("tarea {} abortada: {:?}", task_id, e),
                }
            },
        )?;

        Ok(task)
    }
}

/// Loop periódico que limpia del registro las ejecuciones ya terminadas.
pub async fn run_sweep_loop(registry: TaskRegistry, period: Duration) {
    loop {
        sleep(period).await;

        match registry.sweep() {
            Ok(report) if report.removed > 0 => {
                info!(
                    "registro: {} entradas terminadas removidas, {} activas",
                    report.removed, report.remaining
                );
            }
            Ok(_) => {}
            Err(e) => warn!("error en sweep del registro: {:?}", e),
        }
    }
}

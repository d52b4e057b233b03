use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use common::{CancelReport, RunningTaskInfo, RunningTasksSnapshot, SweepReport, TaskId};

struct Entry {
    dataset_id: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type Entries = Arc<Mutex<HashMap<TaskId, Entry>>>;

/// Ejecuciones vivas en este proceso. Sólo sirve para observar y cancelar;
/// el estado real de cada tarea está en el almacenamiento.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    entries: Entries,
}

/// Se suelta cuando termina el future (bien, con error, panic o abort)
/// y saca la entrada del registro.
struct DeregisterGuard {
    entries: Weak<Mutex<HashMap<TaskId, Entry>>>,
    task_id: TaskId,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            if let Ok(mut map) = entries.lock() {
                map.remove(&self.task_id);
                debug!("tarea {} sale del registro", self.task_id);
            }
        }
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanza `fut` y lo registra. El lock se mantiene durante el spawn para que
    /// la baja nunca ocurra antes del alta.
    pub fn spawn<F>(&self, task_id: TaskId, dataset_id: String, cancel: CancellationToken, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut map = self.entries.lock().map_err(|_| anyhow!("lock registry"))?;

        let guard = DeregisterGuard {
            entries: Arc::downgrade(&self.entries),
            task_id: task_id.clone(),
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });

        map.insert(
            task_id,
            Entry {
                dataset_id,
                started_at: Utc::now(),
                cancel,
                handle,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Result<RunningTasksSnapshot> {
        let map = self.entries.lock().map_err(|_| anyhow!("lock registry"))?;
        let mut tasks: Vec<RunningTaskInfo> = map
            .iter()
            .map(|(id, e)| RunningTaskInfo {
                task_id: id.clone(),
                dataset_id: e.dataset_id.clone(),
                started_at: e.started_at,
                finished: e.handle.is_finished(),
                cancel_requested: e.cancel.is_cancelled(),
            })
            .collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.task_id.cmp(&b.task_id)));

        Ok(RunningTasksSnapshot {
            count: tasks.len(),
            tasks,
        })
    }

    /// Pide cancelar todas las ejecuciones que no terminaron. Es cooperativo:
    /// cada una lo ve en su próximo punto de control.
    pub fn cancel_all(&self) -> Result<CancelReport> {
        let map = self.entries.lock().map_err(|_| anyhow!("lock registry"))?;
        let mut cancelled = 0;
        for entry in map.values() {
            if !entry.handle.is_finished() && !entry.cancel.is_cancelled() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        Ok(CancelReport { cancelled })
    }

    /// Saca las entradas cuyo future ya terminó.
    pub fn sweep(&self) -> Result<SweepReport> {
        let mut map = self.entries.lock().map_err(|_| anyhow!("lock registry"))?;
        let before = map.len();
        map.retain(|_, e| !e.handle.is_finished());
        Ok(SweepReport {
            removed: before - map.len(),
            remaining: map.len(),
        })
    }
}

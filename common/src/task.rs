use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;
use crate::{DatasetId, OwnerId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pasos del pipeline; el orden de declaración es el orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RelatedColumns,
    Statistics,
    Visualizations,
    Correlation,
    Prediction,
    Solution,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::RelatedColumns,
        Step::Statistics,
        Step::Visualizations,
        Step::Correlation,
        Step::Prediction,
        Step::Solution,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::RelatedColumns => "related_columns",
            Step::Statistics => "statistics",
            Step::Visualizations => "visualizations",
            Step::Correlation => "correlation",
            Step::Prediction => "prediction",
            Step::Solution => "solution",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownStep(s.to_string()))
    }
}

/// Resultado de cada paso: sólo referencias (ids), nunca los datos completos.
/// El coordinador lo guarda y lo reenvía sin mirar adentro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepResult {
    RelatedColumns { final_columns: Vec<String> },
    Statistics { statistics_id: String },
    Visualizations { visualization_ids: Vec<String> },
    Correlation { correlation_id: String },
    Prediction { prediction_id: String },
    Solution { solution_id: String },
}

impl StepResult {
    pub fn step(&self) -> Step {
        match self {
            StepResult::RelatedColumns { .. } => Step::RelatedColumns,
            StepResult::Statistics { .. } => Step::Statistics,
            StepResult::Visualizations { .. } => Step::Visualizations,
            StepResult::Correlation { .. } => Step::Correlation,
            StepResult::Prediction { .. } => Step::Prediction,
            StepResult::Solution { .. } => Step::Solution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub status: Status,
    pub result: Option<StepResult>,
    pub error: Option<String>,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            status: Status::Pending,
            result: None,
            error: None,
        }
    }
}

/// Registro persistido de una corrida del pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub task_id: TaskId,
    pub dataset_id: DatasetId,
    pub owner_id: OwnerId,
    pub target_column: String,
    pub status: Status,
    pub current_step: Option<Step>,
    pub steps: BTreeMap<Step, StepState>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    pub fn new(task_id: TaskId, dataset_id: DatasetId, owner_id: OwnerId, target_column: String) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            dataset_id,
            owner_id,
            target_column,
            status: Status::Pending,
            current_step: None,
            steps: Step::ALL.into_iter().map(|s| (s, StepState::default())).collect(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_status(&self, step: Step) -> Status {
        self.steps
            .get(&step)
            .map(|s| s.status)
            .unwrap_or(Status::Pending)
    }

    pub fn processing_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, s)| s.status == Status::Processing)
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn failed_step(&self) -> Option<Step> {
        self.steps
            .iter()
            .find(|(_, s)| s.status == Status::Failed)
            .map(|(step, _)| *step)
    }

    fn invalid(step: Step, reason: impl Into<String>) -> AnalysisError {
        AnalysisError::InvalidTransition {
            step,
            reason: reason.into(),
        }
    }

    fn state_mut(&mut self, step: Step) -> &mut StepState {
        self.steps.entry(step).or_default()
    }

    /// pending -> processing. Exige que los pasos anteriores estén completos
    /// y que ningún otro paso esté en curso.
    pub fn begin_step(&mut self, step: Step) -> Result<(), AnalysisError> {
        if self.status.is_terminal() {
            return Err(Self::invalid(step, format!("la tarea ya está {}", self.status)));
        }
        if self.step_status(step) != Status::Pending {
            return Err(Self::invalid(step, format!("el paso está {}", self.step_status(step))));
        }
        if let Some(prev) = Step::ALL
            .into_iter()
            .take_while(|s| *s < step)
            .find(|s| self.step_status(*s) != Status::Completed)
        {
            return Err(Self::invalid(step, format!("el paso previo '{prev}' no está completo")));
        }
        if let Some(other) = self.processing_steps().first() {
            return Err(Self::invalid(step, format!("el paso '{other}' sigue en curso")));
        }

        self.state_mut(step).status = Status::Processing;
        self.status = Status::Processing;
        self.current_step = Some(step);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// processing -> completed. Con el último paso la tarea queda completa.
    pub fn complete_step(&mut self, step: Step, result: StepResult) -> Result<(), AnalysisError> {
        if self.step_status(step) != Status::Processing {
            return Err(Self::invalid(step, format!("el paso está {}", self.step_status(step))));
        }
        if result.step() != step {
            return Err(Self::invalid(
                step,
                format!("resultado de '{}' en el paso equivocado", result.step()),
            ));
        }

        let state = self.state_mut(step);
        state.status = Status::Completed;
        state.result = Some(result);
        state.error = None;

        if Step::ALL.iter().all(|s| self.step_status(*s) == Status::Completed) {
            self.status = Status::Completed;
            self.current_step = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marca el paso como fallido y detiene la tarea. `current_step` queda
    /// apuntando al paso que falló.
    pub fn fail_step(&mut self, step: Step, error: String) -> Result<(), AnalysisError> {
        if self.status.is_terminal() {
            return Err(Self::invalid(step, format!("la tarea ya está {}", self.status)));
        }
        match self.step_status(step) {
            Status::Processing => {}
            Status::Pending if self.processing_steps().is_empty() => {}
            other => return Err(Self::invalid(step, format!("no se puede fallar un paso {other}"))),
        }

        let state = self.state_mut(step);
        state.status = Status::Failed;
        state.error = Some(error.clone());

        self.status = Status::Failed;
        self.current_step = Some(step);
        self.error_message = Some(error);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Punto de entrada genérico de `update_step`.
    pub fn apply(
        &mut self,
        step: Step,
        status: Status,
        result: Option<StepResult>,
        error: Option<String>,
    ) -> Result<(), AnalysisError> {
        match (status, result) {
            (Status::Processing, _) => self.begin_step(step),
            (Status::Completed, Some(result)) => self.complete_step(step, result),
            (Status::Completed, None) => Err(Self::invalid(step, "falta el resultado del paso")),
            (Status::Failed, _) => {
                self.fail_step(step, error.unwrap_or_else(|| "error desconocido".to_string()))
            }
            (Status::Pending, _) => Err(Self::invalid(step, "un paso no puede volver a pending")),
        }
    }

    /// Cambio directo del estado de la tarea; sólo se aceptan estados
    /// coherentes con los pasos.
    pub fn set_status(&mut self, status: Status) -> Result<(), AnalysisError> {
        let ok = match status {
            Status::Pending => self.steps.values().all(|s| s.status == Status::Pending),
            Status::Processing => !self.status.is_terminal(),
            Status::Completed => self.steps.values().all(|s| s.status == Status::Completed),
            Status::Failed => self.failed_step().is_some(),
        };
        if !ok {
            return Err(AnalysisError::InvalidStatus(format!(
                "{} -> {} no es coherente con los pasos",
                self.status, status
            )));
        }
        self.status = status;
        if status == Status::Completed {
            self.current_step = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Verifica los invariantes del registro.
    pub fn check_invariants(&self) -> Result<(), String> {
        let processing = self.processing_steps();
        if processing.len() > 1 {
            return Err(format!("más de un paso en curso: {processing:?}"));
        }

        let all_done = self.steps.len() == Step::ALL.len()
            && self.steps.values().all(|s| s.status == Status::Completed);
        if (self.status == Status::Completed) != all_done {
            return Err(format!("estado {} con pasos {:?}", self.status, self.steps));
        }

        if let Some(failed) = self.failed_step() {
            if self.status != Status::Failed {
                return Err(format!("paso '{failed}' fallido pero la tarea está {}", self.status));
            }
            if let Some(later) = self
                .steps
                .iter()
                .find(|(s, st)| **s > failed && st.status != Status::Pending)
            {
                return Err(format!("el paso '{}' avanzó después de un fallo", later.0));
            }
        } else if self.status == Status::Failed {
            return Err("tarea fallida sin paso fallido".to_string());
        }

        Ok(())
    }
}

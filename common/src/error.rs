use thiserror::Error;

use crate::task::Step;

/// Errores de entrada: se devuelven de inmediato al llamador del paso.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("no se encontró la columna objetivo '{0}'")]
    MissingTargetColumn(String),

    #[error("no se encontró la columna de fecha '{0}'")]
    MissingDateColumn(String),

    #[error("paso desconocido '{0}'")]
    UnknownStep(String),

    #[error("transición inválida en el paso '{step}': {reason}")]
    InvalidTransition { step: Step, reason: String },

    #[error("transición inválida del estado de la tarea: {0}")]
    InvalidStatus(String),
}

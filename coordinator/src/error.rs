use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use common::Status;

/// Errores de los pedidos al coordinador (no de los pasos del pipeline,
/// que quedan registrados en la tarea).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset {0} no encontrado")]
    DatasetNotFound(String),

    #[error("tarea {0} no encontrada")]
    TaskNotFound(String),

    #[error("artefacto {0} no encontrado")]
    ArtifactNotFound(String),

    #[error("el recurso pertenece a otro usuario")]
    Forbidden,

    #[error("pedido inválido: {0}")]
    InvalidInput(String),

    #[error("la tarea todavía no terminó (estado {0})")]
    NotCompleted(Status),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::DatasetNotFound(_)
            | PipelineError::TaskNotFound(_)
            | PipelineError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Forbidden => StatusCode::FORBIDDEN,
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotCompleted(_) => StatusCode::CONFLICT,
            PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

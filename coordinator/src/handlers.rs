use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use common::{
    AnalysisTask, CancelReport, DatasetInfo, RunningTasksSnapshot, StartAnalysisRequest,
    StartAnalysisResponse, StoredArtifact, SweepReport, TaskResultView, UploadDatasetRequest,
};

use crate::error::PipelineError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/datasets", post(upload_dataset))
        .route("/api/v1/datasets/:id", get(get_dataset))
        .route("/api/v1/analysis", post(start_analysis))
        .route("/api/v1/analysis/running", get(running_tasks))
        .route("/api/v1/analysis/running/cancel", post(cancel_running))
        .route("/api/v1/analysis/running/cleanup", post(cleanup_running))
        .route("/api/v1/analysis/:id", get(get_task))
        .route("/api/v1/analysis/:id/result", get(get_task_result))
        .route("/api/v1/artifacts/:id", get(get_artifact))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner_id: String,
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn upload_dataset(
    State(state): State<AppState>,
    Json(req): Json<UploadDatasetRequest>,
) -> Result<Json<DatasetInfo>, PipelineError> {
    let info = state.coordinator.register_dataset(req).await?;
    Ok(Json(info))
}

async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DatasetInfo>, PipelineError> {
    Ok(Json(state.coordinator.dataset(&id).await?))
}

// Crea la tarea y la lanza en segundo plano; responde sin esperar
async fn start_analysis(
    State(state): State<AppState>,
    Json(req): Json<StartAnalysisRequest>,
) -> Result<Json<StartAnalysisResponse>, PipelineError> {
    let task = state.launcher.start(req).await?;
    info!("análisis {} lanzado para dataset {}", task.task_id, task.dataset_id);
    Ok(Json(StartAnalysisResponse {
        task_id: task.task_id,
        status: task.status,
    }))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<AnalysisTask>, PipelineError> {
    Ok(Json(state.coordinator.task_for_owner(&id, &q.owner_id).await?))
}

async fn get_task_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<TaskResultView>, PipelineError> {
    Ok(Json(state.coordinator.task_result(&id, &q.owner_id).await?))
}

async fn running_tasks(State(state): State<AppState>) -> Result<Json<RunningTasksSnapshot>, PipelineError> {
    Ok(Json(state.registry.snapshot()?))
}

async fn cancel_running(State(state): State<AppState>) -> Result<Json<CancelReport>, PipelineError> {
    let report = state.registry.cancel_all()?;
    info!("cancelación pedida para {} ejecuciones", report.cancelled);
    Ok(Json(report))
}

async fn cleanup_running(State(state): State<AppState>) -> Result<Json<SweepReport>, PipelineError> {
    Ok(Json(state.registry.sweep()?))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredArtifact>, PipelineError> {
    Ok(Json(state.coordinator.artifact(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn filas() -> Value {
        let rows: Vec<Value> = (1..=6)
            .flat_map(|semana| {
                ["A", "B"].into_iter().map(move |p| {
                    json!({
                        "semana": semana,
                        "fecha": format!("2024-03-{:02}", semana),
                        "producto": p,
                        "descuento": semana % 2,
                        "ventas": semana * 10 + if p == "A" { 5 } else { 0 },
                    })
                })
            })
            .collect();
        Value::Array(rows)
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let app = build_router(AppState::new(&Settings::default()).unwrap());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn subir_analizar_y_consultar() {
        let state = AppState::new(&Settings::default()).unwrap();
        let app = build_router(state.clone());

        let (status, ds) = call(
            &app,
            "POST",
            "/api/v1/datasets",
            Some(json!({ "owner_id": "u1", "name": "ventas.csv", "target_column": "ventas", "rows": filas() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let dataset_id = ds["dataset_id"].as_str().unwrap().to_string();

        let (status, started) = call(
            &app,
            "POST",
            "/api/v1/analysis",
            Some(json!({ "dataset_id": dataset_id, "owner_id": "u1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let task_id = started["task_id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/analysis/{}?owner_id=u1", task_id);
        let mut last = Value::Null;
        for _ in 0..200 {
            let (_, task) = call(&app, "GET", &uri, None).await;
            if task["status"] == "completed" || task["status"] == "failed" {
                last = task;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "completed", "{last}");

        let (status, result) = call(&app, "GET", &format!("/api/v1/analysis/{}/result?owner_id=u1", task_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let corr_id = result["results"]["correlation"]["correlation_id"].as_str().unwrap().to_string();

        let (status, artifact) = call(&app, "GET", &format!("/api/v1/artifacts/{}", corr_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(artifact["artifact"]["kind"], "correlation");

        let (status, _) = call(&app, "GET", &format!("/api/v1/analysis/{}?owner_id=otro", task_id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn errores_se_mapean_a_codigos_http() {
        let app = build_router(AppState::new(&Settings::default()).unwrap());

        let (status, body) = call(&app, "GET", "/api/v1/datasets/nada", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nada"));

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/analysis",
            Some(json!({ "dataset_id": "nada", "owner_id": "u1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, snap) = call(&app, "GET", "/api/v1/analysis/running", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snap["count"], 0);

        let (status, report) = call(&app, "POST", "/api/v1/analysis/running/cleanup", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["removed"], 0);
    }
}

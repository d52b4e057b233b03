use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use common::features::{chronological_partitions, ROLLING_WINDOW};
use common::reports::{Artifact, GroupForecast, ModelMetrics, PredictionReport};
use common::table::{coerce_f64, value_label};
use common::Record;

use crate::collaborators::{PredictionService, StageContext};
use crate::store::Storage;

const MODEL_NAME: &str = "moving_average_4";

/// Máximo de grupos pronosticados.
const MAX_FORECAST_GROUPS: usize = 20;

/// Línea base: el próximo periodo es la media de los últimos 4.
pub struct MovingAveragePredictor {
    store: Arc<dyn Storage>,
    horizon: usize,
}

impl MovingAveragePredictor {
    pub fn new(store: Arc<dyn Storage>, horizon: usize) -> Self {
        Self { store, horizon }
    }
}

fn window_mean(values: &[f64]) -> f64 {
    let start = values.len().saturating_sub(ROLLING_WINDOW);
    let w = &values[start..];
    w.iter().sum::<f64>() / w.len() as f64
}

/// Predicciones dentro de la muestra: (real, predicho) desde la segunda posición.
fn in_sample_pairs(series: &[f64]) -> Vec<(f64, f64)> {
    (1..series.len())
        .map(|i| (series[i], window_mean(&series[..i])))
        .collect()
}

pub fn metrics(pairs: &[(f64, f64)]) -> ModelMetrics {
    if pairs.is_empty() {
        return ModelMetrics::default();
    }
    let n = pairs.len() as f64;
    let mae = pairs.iter().map(|(y, p)| (y - p).abs()).sum::<f64>() / n;
    let sse: f64 = pairs.iter().map(|(y, p)| (y - p).powi(2)).sum();
    let rmse = (sse / n).sqrt();

    let mean = pairs.iter().map(|(y, _)| y).sum::<f64>() / n;
    let sst: f64 = pairs.iter().map(|(y, _)| (y - mean).powi(2)).sum();
    let r2 = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };

    ModelMetrics {
        mae,
        rmse,
        r2,
        samples: pairs.len() as u64,
    }
}

/// Pronóstico recursivo: cada valor predicho entra en la ventana siguiente.
pub fn forecast(series: &[f64], horizon: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let mut history = series.to_vec();
    let mut out = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let next = window_mean(&history);
        history.push(next);
        out.push(next);
    }
    out
}

pub fn predict(
    records: &[Record],
    target: &str,
    date_column: Option<&str>,
    group_column: Option<&str>,
    horizon: usize,
) -> PredictionReport {
    let groups: Vec<String> = group_column.map(|c| vec![c.to_string()]).unwrap_or_default();
    let partitions = chronological_partitions(records, date_column.unwrap_or(""), &groups);

    let mut all_pairs = Vec::new();
    let mut forecasts = Vec::new();

    for (key, rows) in &partitions {
        let group = match group_column {
            Some(_) => match key.first().cloned().flatten() {
                Some(g) => g,
                None => continue,
            },
            None => "total".to_string(),
        };

        let series: Vec<f64> = rows
            .iter()
            .filter_map(|&i| records[i].get(target).and_then(coerce_f64))
            .collect();
        if series.is_empty() {
            continue;
        }

        all_pairs.extend(in_sample_pairs(&series));
        let last_period = date_column
            .zip(rows.last())
            .and_then(|(d, &i)| records[i].get(d))
            .and_then(value_label);
        let values = forecast(&series, horizon);
        forecasts.push((
            series.len(),
            GroupForecast {
                group,
                last_period,
                values,
            },
        ));
    }

    // series más largas primero
    forecasts.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.group.cmp(&b.1.group)));
    let forecasts: Vec<GroupForecast> = forecasts
        .into_iter()
        .take(MAX_FORECAST_GROUPS)
        .map(|(_, f)| f)
        .collect();

    PredictionReport {
        target_column: target.to_string(),
        model: MODEL_NAME.to_string(),
        horizon,
        metrics: metrics(&all_pairs),
        forecasts,
    }
}

#[async_trait]
impl PredictionService for MovingAveragePredictor {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String> {
        let report = predict(
            ctx.records,
            &ctx.task.target_column,
            ctx.config.date_column.as_deref(),
            ctx.config.group_by_column.as_deref(),
            self.horizon,
        );
        if report.metrics.samples == 0 && report.forecasts.is_empty() {
            bail!("no hay valores numéricos de '{}' para predecir", ctx.task.target_column);
        }

        self.store
            .save_artifact(
                &ctx.dataset.dataset_id,
                Some(&ctx.task.task_id),
                Artifact::Prediction(report),
            )
            .await
            .context("guardando predicción")
    }
}

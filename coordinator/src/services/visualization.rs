use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use common::features::chronological_partitions;
use common::reports::{Artifact, ChartKind, ChartPoint, ChartSeries, ChartSpec};
use common::table::{coerce_f64, value_label};
use common::Record;

use crate::collaborators::{StageContext, VisualizationService};
use crate::store::Storage;

const TREND_GROUPS: usize = 10;
const COUNT_GROUPS: usize = 20;

/// Especificaciones de gráficos; no se renderiza nada.
pub struct BuiltinVisualization {
    store: Arc<dyn Storage>,
}

impl BuiltinVisualization {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }
}

/// Grupos con más filas primero; empate por nombre.
fn largest_groups(counts: &BTreeMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut items: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(n);
    items
}

fn group_counts(records: &[Record], column: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for r in records {
        if let Some(label) = r.get(column).and_then(value_label) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
}

/// Serie del objetivo ordenada por la columna de fecha (o por posición si no hay).
pub fn trend_chart(
    records: &[Record],
    target: &str,
    date_column: Option<&str>,
    group_column: Option<&str>,
    counts: &BTreeMap<String, u64>,
) -> ChartSpec {
    let groups: Vec<String> = group_column.map(|c| vec![c.to_string()]).unwrap_or_default();
    let order_by = date_column.unwrap_or("");
    let partitions = chronological_partitions(records, order_by, &groups);

    let wanted: Vec<String> = match group_column {
        Some(_) => largest_groups(counts, TREND_GROUPS)
            .into_iter()
            .map(|(g, _)| g)
            .collect(),
        None => vec!["total".to_string()],
    };

    let mut series = Vec::new();
    for (key, rows) in &partitions {
        let name = match group_column {
            Some(_) => match key.first().cloned().flatten() {
                Some(name) => name,
                None => continue,
            },
            None => "total".to_string(),
        };
        if !wanted.contains(&name) {
            continue;
        }

        let points = rows
            .iter()
            .enumerate()
            .filter_map(|(pos, &i)| {
                let y = records[i].get(target).and_then(coerce_f64)?;
                let x = date_column
                    .and_then(|d| records[i].get(d))
                    .and_then(value_label)
                    .unwrap_or_else(|| pos.to_string());
                Some(ChartPoint { x, y })
            })
            .collect();
        series.push(ChartSeries { name, points });
    }

    // mismo orden que `wanted`
    series.sort_by_key(|s| wanted.iter().position(|w| *w == s.name));

    ChartSpec {
        kind: ChartKind::Line,
        title: format!("Tendencia de {}", target),
        x_label: date_column.unwrap_or("periodo").to_string(),
        y_label: target.to_string(),
        series,
    }
}

pub fn count_chart(group_column: &str, counts: &BTreeMap<String, u64>) -> ChartSpec {
    let points = largest_groups(counts, COUNT_GROUPS)
        .into_iter()
        .map(|(x, n)| ChartPoint { x, y: n as f64 })
        .collect();

    ChartSpec {
        kind: ChartKind::Bar,
        title: format!("Registros por {}", group_column),
        x_label: group_column.to_string(),
        y_label: "registros".to_string(),
        series: vec![ChartSeries {
            name: group_column.to_string(),
            points,
        }],
    }
}

#[async_trait]
impl VisualizationService for BuiltinVisualization {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<Vec<String>> {
        let target = ctx.task.target_column.as_str();
        let group_column = ctx.config.group_by_column.as_deref();
        let counts = match group_column {
            Some(_) if !ctx.config.group_counts.is_empty() => ctx.config.group_counts.clone(),
            Some(col) => group_counts(ctx.records, col),
            None => BTreeMap::new(),
        };

        let mut charts = vec![trend_chart(
            ctx.records,
            target,
            ctx.config.date_column.as_deref(),
            group_column,
            &counts,
        )];
        if let Some(col) = group_column {
            charts.push(count_chart(col, &counts));
        }

        let mut ids = Vec::with_capacity(charts.len());
        for chart in charts {
            let id = self
                .store
                .save_artifact(&ctx.dataset.dataset_id, Some(&ctx.task.task_id), Artifact::Chart(chart))
                .await
                .context("guardando gráfico")?;
            ids.push(id);
        }
        Ok(ids)
    }
}

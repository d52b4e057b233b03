use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use common::reports::{Artifact, StatisticsReport};
use common::stats::describe;

use crate::collaborators::{
    narrate_or_template, NarrativeGenerator, NarrativeRequest, StageContext, StatisticsService,
};
use crate::store::Storage;

/// Grupos que entran en el prompt, ordenados por media.
const PROMPT_GROUPS: usize = 5;

pub struct BuiltinStatistics {
    store: Arc<dyn Storage>,
    narrator: Arc<dyn NarrativeGenerator>,
}

impl BuiltinStatistics {
    pub fn new(store: Arc<dyn Storage>, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        Self { store, narrator }
    }
}

fn top_groups_by_mean(report: &StatisticsReport) -> Vec<(&String, &common::reports::Summary)> {
    let mut groups: Vec<_> = report.by_group.iter().collect();
    groups.sort_by(|a, b| b.1.mean.total_cmp(&a.1.mean));
    groups.truncate(PROMPT_GROUPS);
    groups
}

fn statistics_prompt(report: &StatisticsReport) -> String {
    let o = &report.overall;
    let mut p = format!(
        "Estadísticas de '{}':\n- cantidad: {}\n- media: {:.2}\n- mediana: {:.2}\n- desvío: {:.2}\n- mínimo: {:.2}\n- máximo: {:.2}\n- suma: {:.2}\n",
        report.target_column, o.count, o.mean, o.median, o.std, o.min, o.max, o.sum
    );

    if let Some(col) = &report.group_by_column {
        let _ = writeln!(p, "\nPor {} (top {} por media):", col, PROMPT_GROUPS);
        for (name, s) in top_groups_by_mean(report) {
            let _ = writeln!(p, "- {}: n={}, media={:.2}, mediana={:.2}", name, s.count, s.mean, s.median);
        }
    }

    p.push_str(
        "\nExplicá en menos de 200 caracteres: rasgos principales, diferencias entre grupos, \
         forma de la distribución y una lectura de negocio.",
    );
    p
}

fn statistics_template(report: &StatisticsReport) -> String {
    let o = &report.overall;
    let mut text = format!(
        "'{}' tiene {} registros con media {:.2} (mediana {:.2}, desvío {:.2}), entre {:.2} y {:.2}.",
        report.target_column, o.count, o.mean, o.median, o.std, o.min, o.max
    );
    if let (Some(col), Some((name, s))) = (
        &report.group_by_column,
        top_groups_by_mean(report).into_iter().next(),
    ) {
        let _ = write!(text, " El {} con mayor media es '{}' ({:.2}).", col, name, s.mean);
    }
    text
}

#[async_trait]
impl StatisticsService for BuiltinStatistics {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String> {
        let mut report = describe(
            ctx.records,
            &ctx.task.target_column,
            ctx.config.group_by_column.as_deref(),
        )?;

        let request = NarrativeRequest {
            topic: "statistics".to_string(),
            prompt: statistics_prompt(&report),
        };
        let (text, _) =
            narrate_or_template(self.narrator.as_ref(), &request, || statistics_template(&report)).await;
        report.explanation = text;

        self.store
            .save_artifact(
                &ctx.dataset.dataset_id,
                Some(&ctx.task.task_id),
                Artifact::Statistics(report),
            )
            .await
            .context("guardando estadísticas")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::stats::summarize;
    use std::collections::BTreeMap;

    #[test]
    fn plantilla_menciona_el_grupo_con_mayor_media() {
        let mut by_group = BTreeMap::new();
        by_group.insert("A".to_string(), summarize(&[1.0, 2.0]));
        by_group.insert("B".to_string(), summarize(&[10.0, 20.0]));
        let report = StatisticsReport {
            target_column: "ventas".into(),
            group_by_column: Some("producto".into()),
            overall: summarize(&[1.0, 2.0, 10.0, 20.0]),
            by_group,
            explanation: String::new(),
        };

        let text = statistics_template(&report);
        assert!(text.contains("'B'"));
        assert!(statistics_prompt(&report).contains("Por producto"));
    }
}

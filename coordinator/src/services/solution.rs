use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use common::reports::{Artifact, PredictionReport, SolutionReport};
use common::{CorrelationResult, Step, StepResult};

use crate::collaborators::{
    narrate_or_template, NarrativeGenerator, NarrativeRequest, SolutionService, StageContext,
};
use crate::store::Storage;

/// R² a partir del cual el modelo se considera confiable.
const GOOD_R2: f64 = 0.7;

/// Features recomendadas.
const FOCUS_FEATURES: usize = 3;

pub struct BuiltinSolution {
    store: Arc<dyn Storage>,
    narrator: Arc<dyn NarrativeGenerator>,
}

impl BuiltinSolution {
    pub fn new(store: Arc<dyn Storage>, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        Self { store, narrator }
    }

    async fn load(&self, id: &str) -> Option<Artifact> {
        match self.store.get_artifact(id).await {
            Ok(found) => found.map(|a| a.artifact),
            Err(e) => {
                warn!("no se pudo leer el artefacto {}: {:#}", id, e);
                None
            }
        }
    }

    async fn inputs(&self, ctx: &StageContext<'_>) -> (Option<CorrelationResult>, Option<PredictionReport>) {
        let result_of = |step: Step| ctx.task.steps.get(&step).and_then(|s| s.result.clone());

        let mut correlation = None;
        if let Some(StepResult::Correlation { correlation_id }) = result_of(Step::Correlation) {
            if let Some(Artifact::Correlation(c)) = self.load(&correlation_id).await {
                correlation = Some(c);
            }
        }

        let mut prediction = None;
        if let Some(StepResult::Prediction { prediction_id }) = result_of(Step::Prediction) {
            if let Some(Artifact::Prediction(p)) = self.load(&prediction_id).await {
                prediction = Some(p);
            }
        }

        (correlation, prediction)
    }
}

/// Insights y recomendaciones por reglas.
pub fn default_insights(
    correlation: Option<&CorrelationResult>,
    prediction: Option<&PredictionReport>,
) -> (Vec<String>, Vec<String>) {
    let mut insights = Vec::new();
    let mut recommendations = Vec::new();

    if let Some(c) = correlation {
        insights.push(format!(
            "Se analizaron {} features contra '{}'.",
            c.overall.len(),
            c.target_column
        ));
        if let Some(top) = c.top.first() {
            insights.push(format!(
                "La feature más asociada es '{}' (r = {:.2}).",
                top.feature, top.correlation
            ));
        }

        let mut by_weight: Vec<(&String, &f64)> = c.weights.iter().collect();
        by_weight.sort_by(|a, b| b.1.total_cmp(a.1));
        let focus: Vec<&str> = by_weight
            .iter()
            .take(FOCUS_FEATURES)
            .map(|(k, _)| k.as_str())
            .collect();
        if !focus.is_empty() {
            recommendations.push(format!("Concentrarse en: {}.", focus.join(", ")));
        }
    }

    if let Some(p) = prediction {
        insights.push(format!(
            "El modelo {} obtuvo MAE {:.2}, RMSE {:.2} y R² {:.2}.",
            p.model, p.metrics.mae, p.metrics.rmse, p.metrics.r2
        ));
        if p.metrics.r2 > GOOD_R2 {
            recommendations.push("La predicción es confiable para planificar.".to_string());
        } else {
            recommendations.push(
                "Juntar más historia o variables para mejorar la predicción.".to_string(),
            );
        }
    }

    if insights.is_empty() {
        insights.push("No hay resultados previos para interpretar.".to_string());
        recommendations.push("Volver a correr el análisis completo.".to_string());
    }

    (insights, recommendations)
}

fn solution_prompt(target: &str, insights: &[String], recommendations: &[String]) -> String {
    let mut p = format!("Resultados del análisis de '{}':\n", target);
    for i in insights {
        let _ = writeln!(p, "- {}", i);
    }
    p.push_str("\nRecomendaciones preliminares:\n");
    for r in recommendations {
        let _ = writeln!(p, "- {}", r);
    }
    p.push_str("\nRedactá un resumen ejecutivo con acciones concretas.");
    p
}

#[async_trait]
impl SolutionService for BuiltinSolution {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<String> {
        let (correlation, prediction) = self.inputs(ctx).await;
        let (insights, recommendations) = default_insights(correlation.as_ref(), prediction.as_ref());

        let target = ctx.task.target_column.as_str();
        let request = NarrativeRequest {
            topic: "solution".to_string(),
            prompt: solution_prompt(target, &insights, &recommendations),
        };
        let (generated_text, source) = narrate_or_template(self.narrator.as_ref(), &request, || {
            format!("{}\n\n{}", insights.join("\n"), recommendations.join("\n"))
        })
        .await;

        let report = SolutionReport {
            target_column: target.to_string(),
            insights,
            recommendations,
            generated_text,
            source,
        };

        self.store
            .save_artifact(&ctx.dataset.dataset_id, Some(&ctx.task.task_id), Artifact::Solution(report))
            .await
            .context("guardando solución")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::reports::ModelMetrics;
    use std::collections::BTreeMap;

    #[test]
    fn sin_resultados_previos_hay_mensaje_por_defecto() {
        let (i, r) = default_insights(None, None);
        assert_eq!(i.len(), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn recomienda_features_de_mayor_peso() {
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 0.1);
        weights.insert("b".to_string(), 0.6);
        weights.insert("c".to_string(), 0.3);
        let corr = CorrelationResult {
            target_column: "ventas".into(),
            overall: BTreeMap::new(),
            by_group: BTreeMap::new(),
            weights,
            top: Vec::new(),
        };
        let pred = PredictionReport {
            target_column: "ventas".into(),
            model: "m".into(),
            horizon: 1,
            metrics: ModelMetrics {
                r2: 0.9,
                ..Default::default()
            },
            forecasts: Vec::new(),
        };

        let (_, r) = default_insights(Some(&corr), Some(&pred));
        assert_eq!(r[0], "Concentrarse en: b, c, a.");
        assert!(r[1].contains("confiable"));
    }
}

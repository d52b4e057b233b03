use std::collections::BTreeMap;

use crate::error::AnalysisError;
use crate::reports::{StatisticsReport, Summary};
use crate::table::{coerce_f64, has_column, value_label, Record};

/// Resumen de una serie; los valores ausentes ya vienen filtrados.
pub fn summarize(values: &[f64]) -> Summary {
    if values.is_empty() {
        return Summary::default();
    }

    let n = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / n as f64;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    let std = if n > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };

    Summary {
        count: n as u64,
        mean,
        median,
        std,
        min: sorted[0],
        max: sorted[n - 1],
        sum,
    }
}

/// Estadística del objetivo, global y por valor de `group_by`.
/// La explicación queda vacía; la completa quien tenga el narrador.
pub fn describe(
    records: &[Record],
    target: &str,
    group_by: Option<&str>,
) -> Result<StatisticsReport, AnalysisError> {
    if !has_column(records, target) {
        return Err(AnalysisError::MissingTargetColumn(target.to_string()));
    }

    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(target).and_then(coerce_f64))
        .collect();

    let group_by = group_by.filter(|g| has_column(records, g));
    let mut by_group = BTreeMap::new();
    if let Some(col) = group_by {
        let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for rec in records {
            let Some(label) = rec.get(col).and_then(value_label) else {
                continue;
            };
            if let Some(v) = rec.get(target).and_then(coerce_f64) {
                buckets.entry(label).or_default().push(v);
            }
        }
        by_group = buckets
            .into_iter()
            .map(|(k, vs)| (k, summarize(&vs)))
            .collect();
    }

    Ok(StatisticsReport {
        target_column: target.to_string(),
        group_by_column: group_by.map(str::to_string),
        overall: summarize(&values),
        by_group,
        explanation: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarize_calcula_medidas_basicas() {
        let s = summarize(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.sum, 10.0);
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.median, 2.5);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert!((s.std - 1.290_994_448_7).abs() < 1e-9);
    }

    #[test]
    fn summarize_un_valor_tiene_desvio_cero() {
        let s = summarize(&[7.0]);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.median, 7.0);
    }

    #[test]
    fn describe_agrupa_e_ignora_no_numericos() {
        let recs: Vec<Record> = [("A", json!(1)), ("A", json!("3")), ("B", json!("x")), ("B", json!(5))]
            .into_iter()
            .map(|(g, v)| {
                let mut r = Record::new();
                r.insert("producto".into(), json!(g));
                r.insert("ventas".into(), v);
                r
            })
            .collect();

        let rep = describe(&recs, "ventas", Some("producto")).unwrap();
        assert_eq!(rep.overall.count, 3);
        assert_eq!(rep.by_group["A"].mean, 2.0);
        assert_eq!(rep.by_group["B"].count, 1);
        assert_eq!(rep.group_by_column.as_deref(), Some("producto"));

        assert!(describe(&recs, "nada", None).is_err());
    }
}

use std::collections::{BTreeSet, HashSet};

use anyhow::{bail, Result};
use async_trait::async_trait;

use common::features::{find_date_column, is_date_like_name};
use common::table::{coerce_f64, is_missing, value_label};
use common::{ColumnClassification, Record};

use crate::collaborators::ColumnClassifier;

const PRICE_KEYWORDS: &[&str] = &[
    "price", "amount", "revenue", "sales", "cost", "precio", "monto", "importe", "ingreso",
    "가격", "금액", "매출", "판매가", "비용",
];

const QUANTITY_KEYWORDS: &[&str] = &[
    "quantity", "qty", "count", "units", "cantidad", "unidades", "수량", "개수", "판매량", "재고",
];

/// Fracción de la muestra que tiene que convertirse a número.
const NUMERIC_RATIO: f64 = 0.8;

/// Máximo de valores distintos para considerar una columna de texto como grupo.
const MAX_GROUP_CARDINALITY: usize = 50;

fn has_keyword(name: &str, keywords: &[&str]) -> bool {
    let lower = name.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

fn words(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comparten dos palabras, o una si el objetivo es corto.
fn is_near_synonym(target: &str, column: &str) -> bool {
    let t = words(target);
    let common = t.intersection(&words(column)).count();
    common >= 2 || (common == 1 && t.len() <= 2)
}

fn is_numeric_sample(column: &str, sample: &[Record]) -> bool {
    let values: Vec<_> = sample
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !is_missing(v))
        .collect();
    if values.is_empty() {
        return false;
    }
    let ok = values.iter().filter(|v| coerce_f64(v).is_some()).count();
    ok as f64 >= values.len() as f64 * NUMERIC_RATIO
}

fn distinct_labels(column: &str, sample: &[Record]) -> usize {
    sample
        .iter()
        .filter_map(|r| r.get(column).and_then(value_label))
        .collect::<BTreeSet<_>>()
        .len()
}

/// Clasificador por reglas sobre los nombres y una muestra de filas.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn classify_columns(
        &self,
        target: &str,
        columns: &[String],
        sample: &[Record],
    ) -> Result<ColumnClassification> {
        if !columns.iter().any(|c| c == target) {
            bail!("la columna objetivo '{}' no está entre las columnas", target);
        }

        let target_is_price = has_keyword(target, PRICE_KEYWORDS);
        let target_is_quantity = has_keyword(target, QUANTITY_KEYWORDS);

        let mut out = ColumnClassification {
            date_column: find_date_column(columns, sample),
            ..Default::default()
        };

        for col in columns.iter().filter(|c| c.as_str() != target) {
            if is_date_like_name(col) {
                continue;
            }

            let direct = (target_is_price && has_keyword(col, QUANTITY_KEYWORDS))
                || (target_is_quantity && has_keyword(col, PRICE_KEYWORDS))
                || is_near_synonym(target, col);
            if direct {
                out.directly_related_columns.push(col.clone());
                continue;
            }

            if is_numeric_sample(col, sample) {
                out.valid_columns.push(col.clone());
            } else {
                let distinct = distinct_labels(col, sample);
                if distinct > 0 && distinct <= MAX_GROUP_CARDINALITY {
                    out.grouping_columns.push(col.clone());
                }
            }
        }

        out.reason = format!(
            "reglas: {} columnas válidas, {} de grupo, {} excluidas por relación directa con '{}'",
            out.valid_columns.len(),
            out.grouping_columns.len(),
            out.directly_related_columns.len(),
            target
        );
        Ok(out)
    }
}

#[async_trait]
impl ColumnClassifier for RuleBasedClassifier {
    async fn classify(
        &self,
        target: &str,
        columns: &[String],
        sample: &[Record],
    ) -> Result<ColumnClassification> {
        self.classify_columns(target, columns, sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Vec<String>, Vec<Record>) {
        let cols: Vec<String> = ["fecha", "producto", "cantidad", "precio_unitario", "descuento", "ventas_monto"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = (0..6)
            .map(|i| {
                let mut r = Record::new();
                r.insert("fecha".into(), json!(format!("2024-01-0{}", i + 1)));
                r.insert("producto".into(), json!(if i % 2 == 0 { "A" } else { "B" }));
                r.insert("cantidad".into(), json!(i * 3));
                r.insert("precio_unitario".into(), json!("12.5"));
                r.insert("descuento".into(), json!(i));
                r.insert("ventas_monto".into(), json!(i * 30));
                r
            })
            .collect();
        (cols, rows)
    }

    #[test]
    fn objetivo_cantidad_excluye_columnas_de_precio() {
        let (cols, rows) = sample();
        let c = RuleBasedClassifier
            .classify_columns("cantidad", &cols, &rows)
            .unwrap();

        assert_eq!(c.date_column.as_deref(), Some("fecha"));
        assert_eq!(c.grouping_columns, vec!["producto"]);
        assert_eq!(c.directly_related_columns, vec!["precio_unitario", "ventas_monto"]);
        assert_eq!(c.valid_columns, vec!["descuento"]);
    }

    #[test]
    fn sinonimos_del_objetivo_se_excluyen() {
        assert!(is_near_synonym("ventas", "ventas_netas"));
        assert!(!is_near_synonym("ventas", "descuento"));
    }

    #[test]
    fn objetivo_inexistente_es_error() {
        let (cols, rows) = sample();
        assert!(RuleBasedClassifier.classify_columns("nada", &cols, &rows).is_err());
    }
}

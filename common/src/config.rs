use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::table::{value_label, Record};
use crate::DatasetId;

/// Salida del clasificador de columnas (externo o por reglas).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnClassification {
    pub grouping_columns: Vec<String>,
    /// Columnas con relación directa con el objetivo; se excluyen.
    pub directly_related_columns: Vec<String>,
    pub valid_columns: Vec<String>,
    pub date_column: Option<String>,
    pub reason: String,
}

/// Configuración por (dataset, objetivo). Sin versión: la última escritura gana,
/// por eso quien la usa la vuelve a leer justo antes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEngineeringConfig {
    pub dataset_id: DatasetId,
    pub target_column: String,
    pub date_column: Option<String>,
    pub grouping_columns: Vec<String>,
    pub excluded_columns: Vec<String>,
    pub valid_columns: Vec<String>,
    pub lag_feature_columns: Vec<String>,
    pub group_by_column: Option<String>,
    pub group_counts: BTreeMap<String, u64>,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

impl FeatureEngineeringConfig {
    pub fn from_classification(
        dataset_id: DatasetId,
        target_column: &str,
        classification: ColumnClassification,
    ) -> Self {
        let valid_columns = classification
            .valid_columns
            .into_iter()
            .filter(|c| c != target_column)
            .collect();

        Self {
            dataset_id,
            target_column: target_column.to_string(),
            date_column: classification.date_column,
            grouping_columns: classification.grouping_columns,
            excluded_columns: classification.directly_related_columns,
            valid_columns,
            lag_feature_columns: Vec::new(),
            group_by_column: None,
            group_counts: BTreeMap::new(),
            reason: classification.reason,
            updated_at: Utc::now(),
        }
    }

    /// Columnas a correlacionar: válidas, sin objetivo ni columnas de grupo.
    pub fn feature_columns(&self) -> Vec<String> {
        let skip: HashSet<&str> = self
            .grouping_columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.target_column.as_str()))
            .collect();
        self.valid_columns
            .iter()
            .filter(|c| !skip.contains(c.as_str()))
            .cloned()
            .collect()
    }

    pub fn final_columns(&self) -> Vec<String> {
        std::iter::once(self.target_column.clone())
            .chain(self.valid_columns.iter().cloned())
            .collect()
    }

    /// Agrega columnas generadas sin duplicar.
    pub fn add_lag_features(&mut self, names: &[String]) {
        for name in names {
            if !self.valid_columns.contains(name) {
                self.valid_columns.push(name.clone());
            }
            if !self.lag_feature_columns.contains(name) {
                self.lag_feature_columns.push(name.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

fn value_counts(records: &[Record], column: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for rec in records {
        if let Some(label) = rec.get(column).and_then(value_label) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
}

/// Columna de grupo principal: la primera con 1 < distintos < 0.5·filas;
/// si ninguna cumple, la primera. Devuelve también el conteo por valor.
pub fn primary_group_column(
    records: &[Record],
    grouping_columns: &[String],
) -> (Option<String>, BTreeMap<String, u64>) {
    let Some(first) = grouping_columns.first() else {
        return (None, BTreeMap::new());
    };

    let rows = records.len() as f64;
    for col in grouping_columns {
        let counts = value_counts(records, col);
        let distinct = counts.len() as f64;
        if distinct > 1.0 && distinct < rows * 0.5 {
            return (Some(col.clone()), counts);
        }
    }

    (Some(first.clone()), value_counts(records, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> FeatureEngineeringConfig {
        FeatureEngineeringConfig::from_classification(
            "d1".into(),
            "ventas",
            ColumnClassification {
                grouping_columns: vec!["producto".into()],
                directly_related_columns: vec!["ingresos".into()],
                valid_columns: vec!["ventas".into(), "precio".into(), "producto".into()],
                date_column: Some("fecha".into()),
                reason: "reglas".into(),
            },
        )
    }

    #[test]
    fn objetivo_no_queda_en_columnas_validas() {
        let c = config();
        assert_eq!(c.valid_columns, vec!["precio", "producto"]);
        assert_eq!(c.feature_columns(), vec!["precio"]);
        assert_eq!(c.final_columns(), vec!["ventas", "precio", "producto"]);
        assert_eq!(c.excluded_columns, vec!["ingresos"]);
    }

    #[test]
    fn add_lag_features_no_duplica() {
        let mut c = config();
        let lag = vec!["precio_rolling_4weeks".to_string()];
        c.add_lag_features(&lag);
        c.add_lag_features(&lag);
        assert_eq!(c.lag_feature_columns, lag);
        assert_eq!(c.valid_columns, vec!["precio", "producto", "precio_rolling_4weeks"]);
    }

    #[test]
    fn primary_group_column_prefiere_cardinalidad_util() {
        let recs: Vec<Record> = (0..10)
            .map(|i| {
                let mut r = Record::new();
                r.insert("id".into(), json!(format!("r{i}")));
                r.insert("region".into(), json!(if i < 5 { "norte" } else { "sur" }));
                r
            })
            .collect();

        let grouping = vec!["id".to_string(), "region".to_string()];
        let (col, counts) = primary_group_column(&recs, &grouping);
        assert_eq!(col.as_deref(), Some("region"));
        assert_eq!(counts["norte"], 5);

        // ninguna cumple: se usa la primera
        let (col, counts) = primary_group_column(&recs, &["id".to_string()]);
        assert_eq!(col.as_deref(), Some("id"));
        assert_eq!(counts.len(), 10);

        assert_eq!(primary_group_column(&recs, &[]), (None, BTreeMap::new()));
    }
}

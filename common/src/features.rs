use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{cmp::Ordering, collections::BTreeMap};
use tracing::debug;

use chrono::NaiveDateTime;

use crate::error::AnalysisError;
use crate::table::{coerce_f64, has_column, value_as_datetime, value_label, Record, Records};

/// Cantidad de periodos previos que suma cada feature rolling.
pub const ROLLING_WINDOW: usize = 4;

/// Sufijo de las columnas generadas.
pub const ROLLING_SUFFIX: &str = "_rolling_4weeks";

/// Palabras clave para detectar la columna temporal por nombre.
const DATE_KEYWORDS: &[&str] = &[
    "date", "time", "fecha", "hora", "날짜", "일자", "시간", "주문일", "배송일", "생산일",
];

/// Cuántos valores de la muestra se prueban al verificar una columna de fecha.
const DATE_PROBE_VALUES: usize = 5;

pub fn rolling_column_name(source: &str) -> String {
    format!("{source}{ROLLING_SUFFIX}")
}

/// Parámetros de generación de features rolling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingFeatureRequest {
    /// Sólo se usa para ordenar dentro de cada grupo.
    pub date_column: String,
    pub target_column: String,
    pub source_columns: Vec<String>,
    /// Vacío = toda la tabla es una sola serie.
    #[serde(default)]
    pub group_by_columns: Vec<String>,
}

/// Clave de orden cronológico. Dentro de una misma columna todas las claves
/// son del mismo tipo (o `Missing`, que siempre queda al final).
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum OrderKey {
    Number(f64),
    Time(NaiveDateTime),
    Text(String),
    Missing,
}

/// Decide cómo ordenar la columna de fecha:
/// 1. índice numérico de periodo si al menos la mitad de los valores es numérica,
/// 2. fecha si al menos la mitad se puede parsear,
/// 3. si no, el texto crudo en orden natural.
fn order_keys(records: &[Record], date_column: &str) -> Vec<OrderKey> {
    let raw: Vec<&Value> = records
        .iter()
        .map(|r| r.get(date_column).unwrap_or(&Value::Null))
        .collect();
    let n = raw.len();

    let numeric: Vec<Option<f64>> = raw.iter().map(|v| coerce_f64(v)).collect();
    if numeric.iter().filter(|v| v.is_none()).count() * 2 <= n {
        return numeric
            .into_iter()
            .map(|v| v.map_or(OrderKey::Missing, OrderKey::Number))
            .collect();
    }

    let times: Vec<Option<NaiveDateTime>> = raw.iter().map(|v| value_as_datetime(v)).collect();
    if times.iter().filter(|v| v.is_none()).count() * 2 <= n {
        return times
            .into_iter()
            .map(|v| v.map_or(OrderKey::Missing, OrderKey::Time))
            .collect();
    }

    debug!(
        "columna '{}' no es numérica ni fecha, se ordena por texto",
        date_column
    );
    raw.iter()
        .map(|v| value_label(v).map_or(OrderKey::Missing, OrderKey::Text))
        .collect()
}

/// Particiona índices de fila por el valor combinado de las columnas de grupo.
/// Sin columnas de grupo hay una sola partición. Un valor ausente forma su propio grupo.
fn partition_rows(records: &[Record], group_by_columns: &[String]) -> BTreeMap<Vec<Option<String>>, Vec<usize>> {
    let mut parts: BTreeMap<Vec<Option<String>>, Vec<usize>> = BTreeMap::new();
    for (idx, rec) in records.iter().enumerate() {
        let key: Vec<Option<String>> = group_by_columns
            .iter()
            .map(|c| rec.get(c).and_then(value_label))
            .collect();
        parts.entry(key).or_default().push(idx);
    }
    parts
}

/// Orden estable: empates se resuelven por índice original de fila.
fn sort_rows(rows: &mut [usize], keys: &[OrderKey]) {
    rows.sort_by(|&a, &b| {
        keys[a]
            .partial_cmp(&keys[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
}

/// Índices de fila en orden cronológico según `date_column`, por grupo.
/// Lo usan también los servicios que dibujan tendencias o pronostican.
pub fn chronological_partitions(
    records: &[Record],
    date_column: &str,
    group_by_columns: &[String],
) -> BTreeMap<Vec<Option<String>>, Vec<usize>> {
    let keys = order_keys(records, date_column);
    let mut parts = partition_rows(records, group_by_columns);
    for rows in parts.values_mut() {
        sort_rows(rows, &keys);
    }
    parts
}

/// Genera una columna `<fuente>_rolling_4weeks` por cada columna fuente.
///
/// Para la fila en la posición `i` de su grupo (ya ordenado por fecha) el valor es
/// la suma de la fuente en las posiciones `i-1..=i-4`; las posiciones inexistentes
/// suman 0. Nunca usa el valor de la propia fila ni filas futuras.
///
/// La salida conserva el orden original de filas; sólo se agregan columnas.
/// Devuelve la tabla nueva y los nombres de columnas generadas.
pub fn generate_rolling_features(
    records: &[Record],
    req: &RollingFeatureRequest,
) -> Result<(Records, Vec<String>), AnalysisError> {
    if records.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    if !has_column(records, &req.date_column) {
        return Err(AnalysisError::MissingDateColumn(req.date_column.clone()));
    }
    if !has_column(records, &req.target_column) {
        return Err(AnalysisError::MissingTargetColumn(req.target_column.clone()));
    }

    let partitions = chronological_partitions(records, &req.date_column, &req.group_by_columns);

    let mut out: Records = records.to_vec();
    let mut new_columns = Vec::new();

    for source in &req.source_columns {
        if !has_column(records, source) {
            debug!("columna fuente '{}' no existe, se omite", source);
            continue;
        }

        let name = rolling_column_name(source);
        let values: Vec<f64> = records
            .iter()
            .map(|r| r.get(source).and_then(coerce_f64).unwrap_or(0.0))
            .collect();

        for rows in partitions.values() {
            for (pos, &row) in rows.iter().enumerate() {
                let start = pos.saturating_sub(ROLLING_WINDOW);
                // i-1, i-2, i-3, i-4
                let sum: f64 = rows[start..pos].iter().rev().map(|&j| values[j]).sum();
                out[row].insert(name.clone(), json!(sum));
            }
        }

        new_columns.push(name);
    }

    Ok((out, new_columns))
}

/// El nombre de la columna sugiere un dato temporal.
pub fn is_date_like_name(column: &str) -> bool {
    let lower = column.to_lowercase();
    DATE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Detecta la columna temporal más probable: nombre con palabra clave
/// y algún valor de la muestra que se pueda parsear como fecha.
pub fn find_date_column(columns: &[String], sample: &[Record]) -> Option<String> {
    columns
        .iter()
        .filter(|col| is_date_like_name(col))
        .find(|col| {
            sample
                .iter()
                .filter_map(|r| r.get(col.as_str()))
                .filter(|v| !v.is_null())
                .take(DATE_PROBE_VALUES)
                .any(|v| value_as_datetime(v).is_some())
        })
        .cloned()
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::table::{coerce_f64, has_column, is_missing, value_as_datetime, value_label, Record};
use crate::weights::calculate_weights;

/// Fracción mínima de valores convertibles para tratar un texto como número.
const NUMERIC_COERCION_RATIO: f64 = 0.8;

/// Grupos con menos filas no se analizan por separado.
const MIN_GROUP_ROWS: usize = 3;

/// Cantidad de features en el ranking `top`.
const TOP_N: usize = 5;

/// feature -> coeficiente
pub type CorrelationMap = BTreeMap<String, f64>;

/// valor de grupo -> feature -> coeficiente
pub type GroupCorrelations = BTreeMap<String, CorrelationMap>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCorrelation {
    pub feature: String,
    pub correlation: f64,
}

/// Resultado derivado; se puede recalcular en cualquier momento desde los datos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub target_column: String,
    pub overall: CorrelationMap,
    /// columna de grupo -> valor de grupo -> feature -> coeficiente
    pub by_group: BTreeMap<String, GroupCorrelations>,
    pub weights: CorrelationMap,
    pub top: Vec<TopCorrelation>,
}

/// Columna ya tipada para el cálculo.
#[derive(Debug, Clone, PartialEq)]
enum Column {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

/// Por qué una feature quedó fuera del resultado.
#[derive(Debug, Error)]
enum SkipReason {
    #[error("sólo {0} pares válidos (mínimo 2)")]
    TooFewPairs(usize),
    #[error("coeficiente indefinido (varianza cero)")]
    Undefined,
}

/* =========================
   Preprocesamiento de columnas
   ========================= */

/// Devuelve las fechas si todos los valores no nulos son textos de fecha.
fn datetime_values(values: &[&Value]) -> Option<Vec<Option<NaiveDateTime>>> {
    let mut any = false;
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        if is_missing(v) {
            out.push(None);
            continue;
        }
        let dt = value_as_datetime(v)?;
        any = true;
        out.push(Some(dt));
    }
    any.then_some(out)
}

/// Rango cronológico 0,1,2,... dentro de cada grupo, por fecha única ordenada.
fn rank_within_groups(times: &[Option<NaiveDateTime>], groups: &[Option<String>]) -> Vec<Option<f64>> {
    let mut uniques: HashMap<&str, BTreeSet<NaiveDateTime>> = HashMap::new();
    for (t, g) in times.iter().zip(groups) {
        if let (Some(t), Some(g)) = (t, g) {
            uniques.entry(g.as_str()).or_default().insert(*t);
        }
    }

    let ranks: HashMap<&str, HashMap<NaiveDateTime, usize>> = uniques
        .into_iter()
        .map(|(g, set)| (g, set.into_iter().enumerate().map(|(i, t)| (t, i)).collect()))
        .collect();

    times
        .iter()
        .zip(groups)
        .map(|(t, g)| match (t, g) {
            (Some(t), Some(g)) => ranks.get(g.as_str()).and_then(|m| m.get(t)).map(|&i| i as f64),
            _ => None,
        })
        .collect()
}

/// Tipado de columna, en orden de prioridad:
/// 1. fecha: rango por grupo si hay `groups`, si no timestamp absoluto,
/// 2. numérica tal cual,
/// 3. texto numérico si al menos el 80% se convierte,
/// 4. categórica.
fn preprocess(rows: &[&Record], column: &str, groups: Option<&[Option<String>]>) -> Column {
    let values: Vec<&Value> = rows
        .iter()
        .map(|r| r.get(column).unwrap_or(&Value::Null))
        .collect();

    if let Some(times) = datetime_values(&values) {
        return Column::Numeric(match groups {
            Some(groups) => rank_within_groups(&times, groups),
            None => times
                .iter()
                .map(|t| t.map(|t| t.and_utc().timestamp() as f64))
                .collect(),
        });
    }

    let present = values.iter().filter(|v| !is_missing(v)).count();
    if present > 0 && values.iter().all(|v| is_missing(v) || v.is_number()) {
        return Column::Numeric(values.iter().map(|v| v.as_f64()).collect());
    }

    let coerced: Vec<Option<f64>> = values.iter().map(|v| coerce_f64(v)).collect();
    let ok = coerced.iter().filter(|v| v.is_some()).count();
    if ok as f64 >= values.len() as f64 * NUMERIC_COERCION_RATIO {
        return Column::Numeric(coerced);
    }

    Column::Categorical(values.iter().map(|v| value_label(v)).collect())
}

/* =========================
   Medidas de asociación
   ========================= */

/// Estandariza (media 0, desvío poblacional 1). Con desvío 0 queda todo en 0.
fn standardize(xs: &[f64]) -> Vec<f64> {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };
    xs.iter().map(|x| (x - mean) / scale).collect()
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let r = sxy / denom;
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Pares donde ambos lados tienen valor.
fn complete_pairs(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

/// Pearson sobre las series estandarizadas.
fn standardized_pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Result<f64, SkipReason> {
    let (xs, ys) = complete_pairs(a, b);
    if xs.len() < 2 {
        return Err(SkipReason::TooFewPairs(xs.len()));
    }
    pearson(&standardize(&xs), &standardize(&ys)).ok_or(SkipReason::Undefined)
}

/// One-hot del lado categórico; se reporta el máximo |r| entre las dummies.
fn max_abs_dummy_correlation(numeric: &[Option<f64>], labels: &[Option<String>]) -> Result<f64, SkipReason> {
    let categories: BTreeSet<&str> = labels.iter().flatten().map(String::as_str).collect();
    if categories.is_empty() {
        return Err(SkipReason::TooFewPairs(0));
    }

    let mut best: Option<f64> = None;
    let mut pairs = 0;
    for cat in categories {
        let dummy: Vec<Option<f64>> = labels
            .iter()
            .map(|l| Some(if l.as_deref() == Some(cat) { 1.0 } else { 0.0 }))
            .collect();
        let (xs, ys) = complete_pairs(numeric, &dummy);
        pairs = xs.len();
        if pairs < 2 {
            continue;
        }
        if let Some(r) = pearson(&xs, &ys) {
            best = Some(best.map_or(r.abs(), |b: f64| b.max(r.abs())));
        }
    }

    match best {
        Some(v) => Ok(v),
        None if pairs < 2 => Err(SkipReason::TooFewPairs(pairs)),
        None => Err(SkipReason::Undefined),
    }
}

/// V de Cramér a partir de la tabla de contingencia.
/// `None` si la tabla es degenerada (menos de 2 filas o columnas).
fn cramers_v(a: &[Option<String>], b: &[Option<String>]) -> Option<f64> {
    let pairs: Vec<(&str, &str)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some((x.as_deref()?, y.as_deref()?)))
        .collect();

    let rows: BTreeSet<&str> = pairs.iter().map(|p| p.0).collect();
    let cols: BTreeSet<&str> = pairs.iter().map(|p| p.1).collect();
    if rows.len() < 2 || cols.len() < 2 {
        return None;
    }

    let row_idx: HashMap<&str, usize> = rows.iter().enumerate().map(|(i, r)| (*r, i)).collect();
    let col_idx: HashMap<&str, usize> = cols.iter().enumerate().map(|(i, c)| (*c, i)).collect();

    let (r, c) = (rows.len(), cols.len());
    let mut observed = vec![vec![0.0_f64; c]; r];
    for (x, y) in &pairs {
        observed[row_idx[x]][col_idx[y]] += 1.0;
    }

    let n = pairs.len() as f64;
    let row_sums: Vec<f64> = observed.iter().map(|row| row.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..c).map(|j| observed.iter().map(|row| row[j]).sum()).collect();

    // corrección de Yates con un grado de libertad
    let yates = (r - 1) * (c - 1) == 1;

    let mut chi2 = 0.0;
    for i in 0..r {
        for j in 0..c {
            let expected = row_sums[i] * col_sums[j] / n;
            let mut obs = observed[i][j];
            if yates {
                let diff = expected - obs;
                obs += diff.signum() * diff.abs().min(0.5);
            }
            chi2 += (obs - expected).powi(2) / expected;
        }
    }

    let k = (r.min(c) - 1) as f64;
    let v = (chi2 / (n * k)).sqrt();
    v.is_finite().then(|| v.clamp(0.0, 1.0))
}

/// Último recurso para dos categóricas: códigos de etiqueta + Pearson.
fn label_encoded_pearson(a: &[Option<String>], b: &[Option<String>]) -> Option<f64> {
    fn encode(labels: &[Option<String>]) -> Vec<f64> {
        let texts: Vec<&str> = labels.iter().map(|l| l.as_deref().unwrap_or("")).collect();
        let uniques: BTreeSet<&str> = texts.iter().copied().collect();
        let codes: HashMap<&str, usize> = uniques.into_iter().enumerate().map(|(i, s)| (s, i)).collect();
        texts.iter().map(|t| codes[t] as f64).collect()
    }

    if a.len() < 2 {
        return None;
    }
    pearson(&encode(a), &encode(b))
}

fn score(target: &Column, feature: &Column) -> Result<f64, SkipReason> {
    match (target, feature) {
        (Column::Numeric(t), Column::Numeric(f)) => standardized_pearson(t, f),
        (Column::Numeric(n), Column::Categorical(c)) | (Column::Categorical(c), Column::Numeric(n)) => {
            max_abs_dummy_correlation(n, c)
        }
        (Column::Categorical(a), Column::Categorical(b)) => {
            let pairs = a.iter().zip(b).filter(|(x, y)| x.is_some() && y.is_some()).count();
            if pairs < 2 {
                return Err(SkipReason::TooFewPairs(pairs));
            }
            Ok(cramers_v(a, b).unwrap_or_else(|| label_encoded_pearson(a, b).unwrap_or(0.0)))
        }
    }
}

/* =========================
   API pública
   ========================= */

fn correlate_rows(
    rows: &[&Record],
    target: &str,
    features: &[String],
    group_by: Option<&str>,
) -> CorrelationMap {
    let groups: Option<Vec<Option<String>>> = group_by.map(|g| {
        rows.iter()
            .map(|r| r.get(g).and_then(value_label))
            .collect()
    });
    let groups = groups.as_deref();

    let target_col = preprocess(rows, target, groups);
    let mut out = CorrelationMap::new();

    for feature in features {
        if !rows.iter().any(|r| r.contains_key(feature.as_str())) {
            warn!("feature '{}' no existe en los datos, se omite", feature);
            continue;
        }

        let feature_col = preprocess(rows, feature, groups);
        match score(&target_col, &feature_col) {
            Ok(v) => {
                out.insert(feature.clone(), v);
            }
            Err(reason) => {
                warn!("no se pudo calcular la correlación de '{}': {}", feature, reason);
            }
        }
    }

    out
}

/// Correlación de cada feature con el objetivo sobre todo el dataset.
///
/// `group_by` sólo cambia el tratamiento de columnas de fecha: se reemplazan
/// por su rango cronológico dentro de cada grupo en lugar del timestamp absoluto.
/// Las features que no se pueden puntuar se omiten.
pub fn correlate(
    records: &[Record],
    target: &str,
    features: &[String],
    group_by: Option<&str>,
) -> Result<CorrelationMap, AnalysisError> {
    if !has_column(records, target) {
        return Err(AnalysisError::MissingTargetColumn(target.to_string()));
    }

    let group_by = group_by.filter(|g| has_column(records, g));
    let rows: Vec<&Record> = records.iter().collect();
    Ok(correlate_rows(&rows, target, features, group_by))
}

/// Repite el cálculo por cada valor distinto de `group_by`.
/// Grupos con menos de 3 filas o sin ninguna feature puntuable no aparecen.
pub fn correlate_by_group(
    records: &[Record],
    target: &str,
    features: &[String],
    group_by: &str,
) -> Result<GroupCorrelations, AnalysisError> {
    if !has_column(records, target) {
        return Err(AnalysisError::MissingTargetColumn(target.to_string()));
    }

    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for rec in records {
        if let Some(label) = rec.get(group_by).and_then(value_label) {
            groups.entry(label).or_default().push(rec);
        }
    }

    let mut out = GroupCorrelations::new();
    for (label, rows) in groups {
        if rows.len() < MIN_GROUP_ROWS {
            debug!("grupo '{}'='{}' con {} filas, se omite", group_by, label, rows.len());
            continue;
        }
        let corr = correlate_rows(&rows, target, features, None);
        if !corr.is_empty() {
            out.insert(label, corr);
        }
    }

    Ok(out)
}

/// Las `TOP_N` features con mayor |coeficiente|, de mayor a menor.
pub fn top_correlations(correlations: &CorrelationMap) -> Vec<TopCorrelation> {
    let mut items: Vec<(&String, &f64)> = correlations.iter().collect();
    items.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(b.0)));
    items
        .into_iter()
        .take(TOP_N)
        .map(|(k, v)| TopCorrelation {
            feature: k.clone(),
            correlation: *v,
        })
        .collect()
}

/// Análisis completo: coeficientes globales, un conjunto por cada columna de
/// grupo (independientes entre sí) y pesos normalizados.
pub fn analyze(
    records: &[Record],
    target: &str,
    features: &[String],
    grouping_columns: &[String],
) -> Result<CorrelationResult, AnalysisError> {
    let overall = correlate(records, target, features, None)?;

    let mut by_group = BTreeMap::new();
    for group_col in grouping_columns {
        if !has_column(records, group_col) {
            continue;
        }
        let groups = correlate_by_group(records, target, features, group_col)?;
        if !groups.is_empty() {
            by_group.insert(group_col.clone(), groups);
        }
    }

    let weights = calculate_weights(&overall);
    let top = top_correlations(&overall);

    Ok(CorrelationResult {
        target_column: target.to_string(),
        overall,
        by_group,
        weights,
        top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn feats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numericas_perfectamente_correlacionadas() {
        let recs: Vec<Record> = (0..5)
            .map(|i| row(&[("ventas", json!(i * 2)), ("precio", json!(10 - i)), ("stock", json!(i))]))
            .collect();

        let out = correlate(&recs, "ventas", &feats(&["precio", "stock"]), None).unwrap();
        assert!((out["precio"] + 1.0).abs() < 1e-9);
        assert!((out["stock"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn texto_mayormente_numerico_se_convierte() {
        let mut recs: Vec<Record> = (0..10)
            .map(|i| row(&[("ventas", json!(i)), ("demora", json!(format!("{}", i * 3)))]))
            .collect();
        // 1 de 10 no numérico: 90% > 80%
        recs[9].insert("demora".into(), json!("n/d"));

        let out = correlate(&recs, "ventas", &feats(&["demora"]), None).unwrap();
        assert!((out["demora"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn numerica_vs_categorica_usa_maximo_de_dummies() {
        let recs = vec![
            row(&[("ventas", json!(10)), ("canal", json!("web"))]),
            row(&[("ventas", json!(11)), ("canal", json!("web"))]),
            row(&[("ventas", json!(1)), ("canal", json!("tienda"))]),
            row(&[("ventas", json!(2)), ("canal", json!("tienda"))]),
        ];

        let out = correlate(&recs, "ventas", &feats(&["canal"]), None).unwrap();
        let v = out["canal"];
        assert!(v > 0.9 && v <= 1.0);
    }

    #[test]
    fn categorica_vs_categorica_usa_cramers_v() {
        let mut recs = Vec::new();
        for _ in 0..10 {
            recs.push(row(&[("segmento", json!("alto")), ("region", json!("norte"))]));
            recs.push(row(&[("segmento", json!("bajo")), ("region", json!("sur"))]));
        }

        let out = correlate(&recs, "segmento", &feats(&["region"]), None).unwrap();
        let v = out["region"];
        // asociación perfecta; Yates la baja un poco
        assert!(v > 0.8 && v <= 1.0);
    }

    #[test]
    fn cramers_v_sin_asociacion_es_cero() {
        let a: Vec<Option<String>> = ["x", "x", "y", "y"].iter().map(|s| Some(s.to_string())).collect();
        let b: Vec<Option<String>> = ["p", "q", "p", "q"].iter().map(|s| Some(s.to_string())).collect();
        // con Yates el chi2 queda en 0
        assert_eq!(cramers_v(&a, &b), Some(0.0));
    }

    #[test]
    fn tabla_degenerada_cae_a_codificacion_de_etiquetas() {
        let recs = vec![
            row(&[("segmento", json!("a")), ("region", json!("norte"))]),
            row(&[("segmento", json!("b")), ("region", json!("norte"))]),
            row(&[("segmento", json!("c")), ("region", json!("norte"))]),
        ];

        // region tiene una sola categoría: Pearson indefinido -> 0.0
        let out = correlate(&recs, "segmento", &feats(&["region"]), None).unwrap();
        assert_eq!(out["region"], 0.0);
    }

    #[test]
    fn features_no_puntuables_se_omiten_sin_fallar() {
        let recs = vec![
            row(&[("ventas", json!(1)), ("constante", json!(5)), ("vacia", Value::Null)]),
            row(&[("ventas", json!(2)), ("constante", json!(5)), ("vacia", Value::Null)]),
            row(&[("ventas", json!(3)), ("constante", json!(5)), ("vacia", json!(1))]),
        ];

        let out = correlate(
            &recs,
            "ventas",
            &feats(&["constante", "vacia", "no_existe"]),
            None,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn feature_toda_nula_no_aparece_ni_en_pesos() {
        let recs: Vec<Record> = (1..=5)
            .map(|i| row(&[("ventas", json!(i * 10)), ("precio", json!(i)), ("vacia", Value::Null)]))
            .collect();

        let res = analyze(&recs, "ventas", &feats(&["precio", "vacia"]), &[]).unwrap();
        assert!(!res.overall.contains_key("vacia"));
        assert!(!res.weights.contains_key("vacia"));
        assert!(res.top.iter().all(|t| t.feature != "vacia"));
        assert!((res.weights["precio"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn categoricas_sin_pares_completos_se_omiten() {
        let recs = vec![
            row(&[("segmento", json!("a")), ("region", json!(""))]),
            row(&[("segmento", json!("b")), ("region", json!(" "))]),
            row(&[("segmento", json!("a")), ("region", Value::Null)]),
        ];

        let out = correlate(&recs, "segmento", &feats(&["region"]), None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn falta_columna_objetivo_es_error() {
        let recs = vec![row(&[("x", json!(1))])];
        let err = correlate(&recs, "ventas", &feats(&["x"]), None).unwrap_err();
        assert_eq!(err, AnalysisError::MissingTargetColumn("ventas".into()));
    }

    #[test]
    fn fechas_con_grupo_se_convierten_en_rango_por_grupo() {
        let rows_owned = vec![
            row(&[("producto", json!("A")), ("fecha", json!("2024-01-01"))]),
            row(&[("producto", json!("A")), ("fecha", json!("2024-01-15"))]),
            row(&[("producto", json!("B")), ("fecha", json!("2023-06-01"))]),
            row(&[("producto", json!("B")), ("fecha", json!("2023-05-01"))]),
        ];
        let rows: Vec<&Record> = rows_owned.iter().collect();
        let groups: Vec<Option<String>> = rows_owned
            .iter()
            .map(|r| r.get("producto").and_then(value_label))
            .collect();

        let ranked = preprocess(&rows, "fecha", Some(&groups));
        assert_eq!(
            ranked,
            Column::Numeric(vec![Some(0.0), Some(1.0), Some(1.0), Some(0.0)])
        );

        let absolute = preprocess(&rows, "fecha", None);
        match absolute {
            Column::Numeric(v) => assert!(v[0].unwrap() > v[2].unwrap()),
            other => panic!("se esperaba numérica, llegó {other:?}"),
        }
    }

    #[test]
    fn correlate_by_group_omite_grupos_chicos() {
        let mut recs = Vec::new();
        for i in 0..4 {
            recs.push(row(&[("producto", json!("A")), ("ventas", json!(i)), ("precio", json!(i * 2))]));
        }
        for i in 0..2 {
            recs.push(row(&[("producto", json!("B")), ("ventas", json!(i)), ("precio", json!(i))]));
        }

        let out = correlate_by_group(&recs, "ventas", &feats(&["precio"]), "producto").unwrap();
        assert_eq!(out.len(), 1);
        assert!((out["A"]["precio"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn analyze_combina_global_grupos_y_pesos() {
        let mut recs = Vec::new();
        for i in 0..6 {
            let region = if i % 2 == 0 { "norte" } else { "sur" };
            recs.push(row(&[
                ("producto", json!(if i < 3 { "A" } else { "B" })),
                ("region", json!(region)),
                ("ventas", json!(i)),
                ("precio", json!(i * 3)),
                ("descuento", json!(6 - i)),
            ]));
        }

        let res = analyze(
            &recs,
            "ventas",
            &feats(&["precio", "descuento"]),
            &feats(&["producto", "region"]),
        )
        .unwrap();

        assert_eq!(res.target_column, "ventas");
        assert_eq!(res.overall.len(), 2);
        assert!(res.by_group.contains_key("producto"));
        assert!(res.by_group.contains_key("region"));
        let total: f64 = res.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(res.top.len(), 2);
    }

    #[test]
    fn top_correlations_ordena_por_valor_absoluto() {
        let mut m = CorrelationMap::new();
        m.insert("a".into(), 0.1);
        m.insert("b".into(), -0.9);
        m.insert("c".into(), 0.5);

        let top = top_correlations(&m);
        let names: Vec<&str> = top.iter().map(|t| t.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    proptest! {
        #[test]
        fn coeficientes_quedan_en_rango(
            data in prop::collection::vec((-1000i64..1000, -1000i64..1000, 0u8..4), 2..30)
        ) {
            let recs: Vec<Record> = data
                .iter()
                .map(|(t, f, c)| row(&[
                    ("ventas", json!(t)),
                    ("precio", json!(f)),
                    ("canal", json!(format!("c{c}"))),
                ]))
                .collect();

            let out = correlate(&recs, "ventas", &feats(&["precio", "canal"]), None).unwrap();
            for v in out.values() {
                prop_assert!((-1.0..=1.0).contains(v));
            }
            if let Some(v) = out.get("canal") {
                prop_assert!((0.0..=1.0).contains(v));
            }
        }

        #[test]
        fn cramers_v_queda_entre_cero_y_uno(
            data in prop::collection::vec((0u8..4, 0u8..3), 2..40)
        ) {
            let a: Vec<Option<String>> = data.iter().map(|(x, _)| Some(format!("a{x}"))).collect();
            let b: Vec<Option<String>> = data.iter().map(|(_, y)| Some(format!("b{y}"))).collect();
            if let Some(v) = cramers_v(&a, &b) {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}

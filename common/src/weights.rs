use std::collections::BTreeMap;

/// Pesos normalizados: |r| / Σ|r|.
/// Si todas las correlaciones son 0 (o no finitas) el peso es uniforme.
pub fn calculate_weights(correlations: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    if correlations.is_empty() {
        return BTreeMap::new();
    }

    let magnitude = |v: &f64| if v.is_finite() { v.abs() } else { 0.0 };
    let total: f64 = correlations.values().map(magnitude).sum();

    if total <= 0.0 {
        let uniform = 1.0 / correlations.len() as f64;
        return correlations.keys().map(|k| (k.clone(), uniform)).collect();
    }

    correlations
        .iter()
        .map(|(k, v)| (k.clone(), magnitude(v) / total))
        .collect()
}

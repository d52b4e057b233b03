use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, Read},
};

/// Fila de datos: objeto JSON columna -> valor.
/// Los valores pueden venir como texto (CSV) o ya tipados (JSON).
pub type Record = Map<String, Value>;

/// Colección en memoria de filas.
pub type Records = Vec<Record>;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Conversión numérica tolerante: número JSON, texto parseable o booleano.
/// Todo lo demás (incluidos NaN/inf) es `None`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

/// Intenta interpretar un texto como fecha/hora.
/// Acepta RFC 3339, fecha con hora, sólo fecha y año-mes ("2024-03").
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // año-mes
    NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Sólo los textos pueden ser fechas; un número nunca se trata como fecha.
pub fn value_as_datetime(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_datetime)
}

/// `null` o texto vacío (celda vacía de un CSV).
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Etiqueta textual de un valor (para agrupar o categorizar).
/// Los valores ausentes no tienen etiqueta.
pub fn value_label(value: &Value) -> Option<String> {
    match value {
        v if is_missing(v) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// true si alguna fila tiene la columna.
pub fn has_column(records: &[Record], column: &str) -> bool {
    records.iter().any(|r| r.contains_key(column))
}

/// Unión de nombres de columna en orden de aparición.
pub fn column_names(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for rec in records {
        for key in rec.keys() {
            if seen.insert(key.as_str()) {
                out.push(key.clone());
            }
        }
    }
    out
}

/* =========================
   Lectura de CSV a Records
   ========================= */

/// Lee un CSV con encabezados. Todos los valores quedan como texto;
/// la coerción numérica se hace después, columna por columna.
pub fn read_csv_to_records(path: &str) -> io::Result<Records> {
    let file = File::open(path)?;
    records_from_csv_reader(file)
}

pub fn records_from_csv_reader<R: Read>(reader: R) -> io::Result<Records> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Limpia BOM por si viene de Excel/Windows
    let headers: Vec<String> = rdr
        .headers()
        .map_err(io::Error::other)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(io::Error::other)?;
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }

        let mut rec = Record::new();
        for (idx, h) in headers.iter().enumerate() {
            let val = row.get(idx).unwrap_or("");
            rec.insert(h.clone(), Value::String(val.to_string()));
        }
        out.push(rec);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_f64_acepta_numeros_y_texto_numerico() {
        assert_eq!(coerce_f64(&json!(3)), Some(3.0));
        assert_eq!(coerce_f64(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(coerce_f64(&json!(true)), Some(1.0));
        assert_eq!(coerce_f64(&json!("abc")), None);
        assert_eq!(coerce_f64(&json!("")), None);
        assert_eq!(coerce_f64(&json!("NaN")), None);
        assert_eq!(coerce_f64(&Value::Null), None);
    }

    #[test]
    fn celdas_vacias_no_tienen_etiqueta() {
        assert!(is_missing(&json!("  ")));
        assert_eq!(value_label(&json!("")), None);
        assert_eq!(value_label(&json!(3)), Some("3".to_string()));
        assert_eq!(value_label(&json!("A")), Some("A".to_string()));
    }

    #[test]
    fn parse_datetime_soporta_formatos_comunes() {
        assert!(parse_datetime("2024-03-05").is_some());
        assert!(parse_datetime("2024/03/05 10:30:00").is_some());
        assert!(parse_datetime("2024-03-05T10:30:00Z").is_some());
        assert!(parse_datetime("2024-03").is_some());
        assert!(parse_datetime("semana 12").is_none());
        assert!(parse_datetime("12").is_none());
    }

    #[test]
    fn value_as_datetime_ignora_numeros() {
        assert!(value_as_datetime(&json!(20240305)).is_none());
        assert!(value_as_datetime(&json!("2024-03-05")).is_some());
    }

    #[test]
    fn records_from_csv_reader_lee_encabezados_y_limpia_bom() {
        let data = "\u{feff}producto,semana,ventas\nA,1,10\nB,2,20\n\n";
        let recs = records_from_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0]["producto"], json!("A"));
        assert_eq!(recs[1]["ventas"], json!("20"));
    }

    #[test]
    fn column_names_respeta_orden_de_aparicion_sin_duplicados() {
        let mut a = Record::new();
        a.insert("x".into(), json!(1));
        let mut b = Record::new();
        b.insert("x".into(), json!(2));
        b.insert("y".into(), json!(3));

        let cols = column_names(&[a, b]);
        assert_eq!(cols, vec!["x".to_string(), "y".to_string()]);
    }
}

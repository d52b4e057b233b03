use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Configuración del coordinador, leída de variables de entorno.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub pipeline_concurrency: usize,
    pub registry_sweep: Duration,
    pub row_limit: usize,
    pub sample_rows: usize,
    pub forecast_periods: usize,
    pub narrator: NarratorSettings,
}

#[derive(Debug, Clone)]
pub struct NarratorSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            pipeline_concurrency: 4,
            registry_sweep: Duration::from_secs(30),
            row_limit: 10_000,
            sample_rows: 20,
            forecast_periods: 30,
            narrator: NarratorSettings {
                api_key: String::new(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "openai/gpt-4o-mini".to_string(),
                timeout: Duration::from_secs(30),
            },
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Valores inválidos (o cero) vuelven al default.
fn env_number<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => v,
            _ => {
                warn!("valor inválido para {}='{}', se usa el default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let d = Settings::default();
        Self {
            bind_addr: env_string("BIND_ADDR", &d.bind_addr),
            pipeline_concurrency: env_number("PIPELINE_CONCURRENCY", d.pipeline_concurrency),
            registry_sweep: Duration::from_secs(env_number(
                "REGISTRY_SWEEP_SECS",
                d.registry_sweep.as_secs(),
            )),
            row_limit: env_number("ROW_LIMIT", d.row_limit),
            sample_rows: env_number("SAMPLE_ROWS", d.sample_rows),
            forecast_periods: env_number("FORECAST_PERIODS", d.forecast_periods),
            narrator: NarratorSettings {
                api_key: env_string("NARRATOR_API_KEY", &d.narrator.api_key),
                base_url: env_string("NARRATOR_BASE_URL", &d.narrator.base_url),
                model: env_string("NARRATOR_MODEL", &d.narrator.model),
                timeout: Duration::from_secs(env_number(
                    "NARRATOR_TIMEOUT_SECS",
                    d.narrator.timeout.as_secs(),
                )),
            },
        }
    }
}

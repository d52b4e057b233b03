use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::table::{column_names, read_csv_to_records};
use common::{
    generate_rolling_features, AnalysisTask, CancelReport, DatasetInfo, RollingFeatureRequest,
    RunningTasksSnapshot, StartAnalysisRequest, StartAnalysisResponse, SweepReport, TaskResultView,
    UploadDatasetRequest,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::env;
use std::path::Path;

/// - En Docker: COORDINATOR_URL=http://coordinator:8080
/// - Local: default http://localhost:8080
fn coordinator_base_url() -> String {
    env::var("COORDINATOR_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para subir datasets y seguir análisis en el coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sube un CSV como dataset
    Upload {
        #[arg(value_name = "CSV")]
        path: String,

        /// Columna objetivo
        #[arg(long)]
        target: String,

        #[arg(long)]
        owner: String,

        /// Nombre del dataset (por defecto, el del archivo)
        #[arg(long)]
        name: Option<String>,
    },
    /// Lanza el análisis completo de un dataset
    Analyze {
        #[arg(value_name = "DATASET_ID")]
        dataset_id: String,

        #[arg(long)]
        owner: String,

        /// Otra columna objetivo distinta a la del dataset
        #[arg(long)]
        target: Option<String>,
    },
    /// Estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(long)]
        owner: String,
    },
    /// Resultados de una tarea completa
    Result {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(long)]
        owner: String,
    },
    /// Ejecuciones vivas en el coordinator
    Running,
    /// Cancela todas las ejecuciones vivas
    CancelAll,
    /// Limpia del registro las ejecuciones terminadas
    Cleanup,
    /// Genera features rolling localmente y las imprime como JSON lines
    Features {
        #[arg(value_name = "CSV")]
        path: String,

        /// Columna usada para ordenar cada serie
        #[arg(long)]
        date: String,

        /// Columnas fuente (se puede repetir)
        #[arg(long = "source", required = true)]
        sources: Vec<String>,

        /// Columnas de grupo (se puede repetir)
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Columna objetivo; por defecto la primera fuente
        #[arg(long)]
        target: Option<String>,
    },
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("el coordinator respondió {}: {}", status, body);
    }
    Ok(resp.json().await?)
}

fn print_task(task: &AnalysisTask) {
    println!("Tarea:");
    println!("  id: {}", task.task_id);
    println!("  dataset: {}", task.dataset_id);
    println!("  objetivo: {}", task.target_column);
    println!("  estado: {}", task.status);
    if let Some(step) = task.current_step {
        println!("  paso actual: {}", step);
    }
    for (step, state) in &task.steps {
        println!("    {:<16} {}", step.as_str(), state.status);
    }
    if let Some(err) = &task.error_message {
        println!("  error: {}", err.lines().next().unwrap_or(err));
    }
}

fn run_features(
    path: &str,
    date: String,
    sources: Vec<String>,
    groups: Vec<String>,
    target: Option<String>,
) -> Result<()> {
    let records = read_csv_to_records(path).with_context(|| format!("leyendo {}", path))?;
    let target_column = match target.or_else(|| sources.first().cloned()) {
        Some(t) => t,
        None => bail!("hace falta al menos una columna fuente"),
    };

    let req = RollingFeatureRequest {
        date_column: date,
        target_column,
        source_columns: sources,
        group_by_columns: groups,
    };
    let (rows, names) = generate_rolling_features(&records, &req)?;
    eprintln!("{} filas, columnas generadas: {}", rows.len(), names.join(", "));

    for row in rows {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = coordinator_base_url();

    match cli.command {
        Commands::Upload {
            path,
            target,
            owner,
            name,
        } => {
            let rows = read_csv_to_records(&path).with_context(|| format!("leyendo {}", path))?;
            if !column_names(&rows).contains(&target) {
                bail!("el CSV no tiene la columna '{}'", target);
            }
            let name = name.unwrap_or_else(|| {
                Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone())
            });

            let req = UploadDatasetRequest {
                owner_id: owner,
                name,
                target_column: Some(target),
                rows,
            };
            let url = format!("{}/api/v1/datasets", base_url);
            let info: DatasetInfo = parse_json(client.post(&url).json(&req).send().await?).await?;

            println!("Dataset creado:");
            println!("  id: {}", info.dataset_id);
            println!("  nombre: {}", info.name);
            println!("  filas: {}", info.row_count);
            println!("  columnas: {}", info.columns.join(", "));
        }
        Commands::Analyze {
            dataset_id,
            owner,
            target,
        } => {
            let req = StartAnalysisRequest {
                dataset_id,
                owner_id: owner,
                target_column: target,
            };
            let url = format!("{}/api/v1/analysis", base_url);
            let resp: StartAnalysisResponse =
                parse_json(client.post(&url).json(&req).send().await?).await?;

            println!("Análisis lanzado:");
            println!("  tarea: {}", resp.task_id);
            println!("  estado: {}", resp.status);
        }
        Commands::Status { task_id, owner } => {
            let url = format!("{}/api/v1/analysis/{}", base_url, task_id);
            let task: AnalysisTask =
                parse_json(client.get(&url).query(&[("owner_id", owner)]).send().await?).await?;
            print_task(&task);
        }
        Commands::Result { task_id, owner } => {
            let url = format!("{}/api/v1/analysis/{}/result", base_url, task_id);
            let view: TaskResultView =
                parse_json(client.get(&url).query(&[("owner_id", owner)]).send().await?).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Running => {
            let url = format!("{}/api/v1/analysis/running", base_url);
            let snap: RunningTasksSnapshot = parse_json(client.get(&url).send().await?).await?;

            println!("Ejecuciones registradas: {}", snap.count);
            for t in snap.tasks {
                println!(
                    "  {} dataset={} desde={} terminada={} cancelada={}",
                    t.task_id, t.dataset_id, t.started_at, t.finished, t.cancel_requested
                );
            }
        }
        Commands::CancelAll => {
            let url = format!("{}/api/v1/analysis/running/cancel", base_url);
            let report: CancelReport = parse_json(client.post(&url).send().await?).await?;
            println!("Cancelación pedida para {} ejecuciones", report.cancelled);
        }
        Commands::Cleanup => {
            let url = format!("{}/api/v1/analysis/running/cleanup", base_url);
            let report: SweepReport = parse_json(client.post(&url).send().await?).await?;
            println!(
                "Removidas {} ejecuciones terminadas, quedan {}",
                report.removed, report.remaining
            );
        }
        Commands::Features {
            path,
            date,
            sources,
            groups,
            target,
        } => run_features(&path, date, sources, groups, target)?,
    }

    Ok(())
}

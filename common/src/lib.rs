pub mod api;
pub mod config;
pub mod correlation;
pub mod error;
pub mod features;
pub mod reports;
pub mod stats;
pub mod table;
pub mod task;
pub mod weights;

pub type TaskId = String;
pub type DatasetId = String;
pub type OwnerId = String;
pub type ArtifactId = String;

pub use api::{
    CancelReport, DatasetInfo, RunningTaskInfo, RunningTasksSnapshot, StartAnalysisRequest,
    StartAnalysisResponse, SweepReport, TaskResultView, UploadDatasetRequest,
};
pub use config::{primary_group_column, ColumnClassification, FeatureEngineeringConfig};
pub use correlation::{CorrelationResult, TopCorrelation};
pub use error::AnalysisError;
pub use features::{find_date_column, generate_rolling_features, RollingFeatureRequest};
pub use reports::{Artifact, StoredArtifact};
pub use table::{Record, Records};
pub use task::{AnalysisTask, Status, Step, StepResult, StepState};
pub use weights::calculate_weights;

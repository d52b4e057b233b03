pub mod prediction;
pub mod solution;
pub mod statistics;
pub mod visualization;

use std::sync::Arc;

use crate::classifier::RuleBasedClassifier;
use crate::collaborators::{Collaborators, NarrativeGenerator};
use crate::store::Storage;

pub use prediction::MovingAveragePredictor;
pub use solution::BuiltinSolution;
pub use statistics::BuiltinStatistics;
pub use visualization::BuiltinVisualization;

/// Servicios incluidos en el binario.
pub fn builtin_collaborators(
    store: Arc<dyn Storage>,
    narrator: Arc<dyn NarrativeGenerator>,
    forecast_periods: usize,
) -> Collaborators {
    Collaborators {
        classifier: Arc::new(RuleBasedClassifier),
        statistics: Arc::new(BuiltinStatistics::new(store.clone(), narrator.clone())),
        visualization: Arc::new(BuiltinVisualization::new(store.clone())),
        prediction: Arc::new(MovingAveragePredictor::new(store.clone(), forecast_periods)),
        solution: Arc::new(BuiltinSolution::new(store, narrator)),
    }
}

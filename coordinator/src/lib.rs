pub mod classifier;
pub mod collaborators;
pub mod error;
pub mod handlers;
pub mod launcher;
pub mod narrative;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod settings;
pub mod state;
pub mod store;

/// Filtro de logs si no hay `RUST_LOG`.
pub const DEFAULT_LOG_FILTER: &str = "coordinator=debug,common=info,tower_http=info";

pub mod analysis;
pub mod config;
pub mod executor;
pub mod logging;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use analysis::*;
pub use config::AnalysisConfig;
pub use executor::*;
pub use model::*;
pub use traits::*;

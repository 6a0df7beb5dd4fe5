// Re-export modules
pub mod config;
pub mod enrichment;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod profile;
pub mod scoring;
pub mod telemetry;
pub mod utils;

// Re-export models
pub mod models {
    // Common models used throughout the engine
    pub use crate::enrichment::{LocationBehavior, LoginBehavior, NetworkBehavior};
    pub use crate::features::{TouchGestureSummary, TypingSummary};
    pub use crate::pipeline::CalculatedSession;
    pub use crate::profile::{LastKnownLocation, UserBehavioralProfile};
    pub use crate::scoring::{RiskFlags, RiskScoreResult};
    pub use crate::telemetry::*;
}

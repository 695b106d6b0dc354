pub mod audit;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod orchestrator;
pub mod validation;
pub mod worker;

pub use config::ValidatorConfig;
pub use orchestrator::{EventReceiver, ValidationEvent, ValidationOrchestrator, VerificationReport};

// Core moderation module - auto-moderation engine, scheduler and report intake.
// Following the same pattern as the other core modules.

pub mod moderation_models;
pub mod moderation_service;
pub mod report_service;
pub mod scheduler;

pub use moderation_models::*;
pub use moderation_service::*;
pub use report_service::*;
pub use scheduler::*;

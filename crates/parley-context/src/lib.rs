//! Parley Context Management - conversation adaptation and budgeting
//!
//! This crate provides:
//! - Message adaptation from wire roles to native provider channels
//! - Input-token budget checks against a model's advertised limit
//! - Summarization of over-budget history, with truncation as the fallback

pub mod adapter;
pub mod error;
pub mod manager;
pub mod summary;
pub mod window;

pub use adapter::adapt;
pub use error::{ContextError, ContextResult};
pub use manager::{BudgetAction, BudgetManager, BudgetOutcome};
pub use window::BudgetPolicy;

/// Prelude for common imports
pub mod prelude {
    pub use crate::adapter::adapt;
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::manager::{BudgetAction, BudgetManager, BudgetOutcome};
    pub use crate::window::BudgetPolicy;
}

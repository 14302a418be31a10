//! Model catalog, budget governance and selection
//!
//! Maps a task category and sensitivity level onto a primary/fallback model
//! pair, downgrading to cheaper models once monthly spend crosses the
//! configured threshold.

pub mod budget;
pub mod catalog;
pub mod selector;

pub use budget::{BudgetGuard, BudgetStatus, SpendSource, start_of_month};
pub use catalog::{DEFAULT_TASK, ModelCatalog, ModelConfig, ModelKey, TaskCategory};
pub use selector::{ModelSelection, ModelSelector};

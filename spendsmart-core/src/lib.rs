//! spendsmart-core: domain types, category enum, error taxonomy, run stats

pub mod category;
pub mod error;
pub mod run;
pub mod transaction;

pub use category::{Categorization, Category};
pub use error::{SpendError, Stage, StageError};
pub use run::RunStats;
pub use transaction::Transaction;

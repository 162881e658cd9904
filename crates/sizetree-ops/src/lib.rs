//! File operations for sizetree.
//!
//! Deleting is best effort: every requested path is attempted and the
//! failures are reported alongside the successes.

mod delete;
mod operation;

pub use delete::delete_paths;
pub use operation::{DeleteOptions, DeleteReport, OperationError};

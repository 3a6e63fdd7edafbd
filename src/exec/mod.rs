//! Template execution
//!
//! Walking a tree writes literal text straight to the output. A printed
//! value becomes a placeholder plus an entry in the argument list, unless
//! the action's last command is a literal or a text function.

mod engine;
mod error;
mod output;

pub(crate) use engine::execute;
pub use error::ExecError;
pub use output::{Mode, Placeholder, Rendered};

//! Utilities shared across the stepstack crates.

mod logging;
mod path_processing;
mod value_semantics;

pub use logging::init_tracing;
pub use path_processing::expand_tilde;
pub use value_semantics::{is_truthy, matches_attributes, truthy_entry};

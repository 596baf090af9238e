mod value;
mod walk;

pub use value::Value;
pub use walk::{aggregate_container, aggregate_nested, ItemFilter, TraversalOutcome};

//! Composition of field subscriptions into records and variables

mod object;
mod sort;
mod variable;

pub use object::{ObjectComposer, StructureItem};
pub use sort::{compare_numeric, compare_values, parse_float, sanitize_sort_params, sort_records, SortKey, SortParam};
pub use variable::{VariableConfig, VariableView};

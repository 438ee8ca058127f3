//! Pure translation of command sub-parts: predicates, projections, updates.

pub mod predicate;
pub mod projection;
pub mod update;

pub use predicate::{Collation, translate_optional, translate_predicate};
pub use projection::{Fetched, flatten_fields, resolve_path, unwrap_single};
pub use update::{BuiltUpdate, UpdateMode, UpdateOperator, build_update, ensure_replacement};

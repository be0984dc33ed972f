// ============================================================================
// Result values
// ============================================================================

#[allow(clippy::module_inception)]
mod result;

pub use result::{LoadResult, ResultValue, Tuple};

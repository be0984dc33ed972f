pub mod source;

pub use source::{RowSource, VecRowSource};

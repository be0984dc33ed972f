pub mod error;
pub mod keys;
pub mod path;
pub mod types;
pub mod value;

pub use error::{LoadError, Result};
pub use keys::{CollectionKey, EntityKey};
pub use path::{ELEMENT_TOKEN, NavigablePath};
pub use types::{Identifier, Row};
pub use value::{DataType, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    /// A discriminator value (or an already-loaded instance) does not belong
    /// to the entity type requested at this position of the fetch graph.
    #[error("Wrong class: discriminator {discriminator} of entity '{entity}' (id {id}) maps to no known subtype")]
    WrongClass {
        discriminator: String,
        entity: String,
        id: String,
    },

    #[error("Required column for '{entity}.{attribute}' was NULL (key {key})")]
    MalformedColumn {
        entity: String,
        attribute: String,
        key: String,
    },

    #[error("Row was updated or deleted by another transaction: {entity}#{id}")]
    StaleState { entity: String, id: String },

    #[error("Entity '{0}' not found in metamodel")]
    UnknownEntity(String),

    #[error("Collection role '{0}' not found in metamodel")]
    UnknownCollectionRole(String),

    #[error("Attribute '{attribute}' not found on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Invalid result shape: {0}")]
    InvalidShape(String),

    #[error("Invalid metamodel: {0}")]
    InvalidMetamodel(String),

    #[error("Column position {position} out of range (row has {width} columns)")]
    ColumnOutOfRange { position: usize, width: usize },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Illegal initializer state: {0}")]
    IllegalState(String),

    #[error("Row source error: {0}")]
    RowSource(String),

    #[error("Row transformer error: {0}")]
    Transformer(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl<T> From<std::sync::PoisonError<T>> for LoadError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for LoadError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LoadError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

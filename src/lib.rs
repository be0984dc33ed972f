// ============================================================================
// graphload Library
// ============================================================================
//
// Turns flat result rows into object graphs: entities with composite values,
// to-one references and owned collections, registered in a per-session
// identity map and coordinated with a second-level cache.
//
// ============================================================================

pub mod cache;
pub mod core;
pub mod load;
pub mod metamodel;
pub mod result;
pub mod row;
pub mod session;

// Re-export main types for convenience
pub use self::core::{CollectionKey, DataType, EntityKey, Identifier, LoadError, NavigablePath, Result, Value};
pub use result::{LoadResult, ResultValue, Tuple};

pub use cache::{CacheBridge, CacheRegion, CacheRegionConfig, LruCacheRegion};
pub use load::{
    CollectionFetchSpec, CollectionResultSpec, ElementSpec, EmbeddedSpec, EntityResultSpec, ListResultsConsumer,
    ResultSetProcessor, ResultShape, RowReader, RowTransformer, TransformerRegistry,
};
pub use metamodel::{
    AttributeMapping, CollectionDescriptor, CollectionKind, ElementKind, EmbeddableDescriptor, EntityDefinition,
    Metamodel,
};
pub use row::{RowSource, VecRowSource};
pub use session::{
    AttributeValue, CacheMode, CollectionRef, EntityRef, LoadEventListener, LockMode, ProcessingOptions, Session,
    SessionConfig,
};

/// Compiles `shape` and reads every row of `source` into `session`.
///
/// ```
/// use graphload::{
///     DataType, EntityDefinition, EntityResultSpec, Metamodel, ProcessingOptions, ResultShape, Session, Value,
///     VecRowSource,
/// };
///
/// # fn main() -> graphload::Result<()> {
/// let metamodel = Metamodel::builder()
///     .entity(
///         EntityDefinition::new("Customer")
///             .identifier("id", DataType::Integer)
///             .basic("name", DataType::Text),
///     )
///     .build()?;
/// let mut session = Session::new(metamodel);
/// let shape = ResultShape::new().entity(EntityResultSpec::new("c", "Customer").id(0).column("name", 1));
/// let mut rows = VecRowSource::from_rows(vec![vec![Value::Integer(1), Value::Text("Ann".into())]]);
///
/// let result = graphload::load(&shape, &mut rows, &mut session, &ProcessingOptions::default())?;
/// assert_eq!(result.entities().len(), 1);
/// # Ok(())
/// # }
/// ```
pub fn load(
    shape: &ResultShape,
    source: &mut dyn RowSource,
    session: &mut Session,
    options: &ProcessingOptions,
) -> Result<LoadResult> {
    let mut reader = shape.compile(session.metamodel(), &TransformerRegistry::default())?;
    ListResultsConsumer::consume(&mut reader, source, session, options)
}

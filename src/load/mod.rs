// ============================================================================
// Row loading
// ============================================================================
//
// A result shape compiles into a RowReader: an arena of initializers (one
// per entity, embeddable or collection position in the fetch graph) plus the
// assemblers producing each top-level value. Every row runs three passes
// over the initializers (resolve key, resolve instance, initialize) and
// then resets them. Collections are staged in a LoadContext and published
// when the result set finishes.
//
// ============================================================================

pub mod assembler;
pub mod circular;
pub mod collection;
pub mod consumer;
pub mod context;
pub mod embedded;
pub mod entity;
pub mod initializer;
pub mod reader;
pub mod shape;
pub mod state;
pub mod transformer;

pub use assembler::{AttributeAssembler, BasicAssembler, HydratedValue, ResultAssembler};
pub use circular::CircularFetchAssembler;
pub use collection::{CollectionInitializer, CollectionOwner};
pub use consumer::{ListResultsConsumer, ResultSetProcessor};
pub use context::{LoadContext, LoadingCollectionEntry, LoadingEntityEntry};
pub use embedded::EmbeddableInitializer;
pub use entity::EntityInitializer;
pub use initializer::{Initializer, InitializerKind};
pub use reader::RowReader;
pub use shape::{
    CollectionFetchSpec, CollectionResultSpec, ElementSpec, EmbeddedSpec, EntityResultSpec, FetchSpec,
    ResultShape,
};
pub use state::{InitializerData, InitializerState, RowProcessingState};
pub use transformer::{
    ArrayTransformer, ConstructorTransformer, IdentityTransformer, RowTransformer, SingleColumnTransformer,
    TransformerRegistry, TupleTransformer,
};

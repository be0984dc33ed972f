// ============================================================================
// Metamodel
// ============================================================================
//
// Entity, embeddable and collection metadata. Compiled once into an
// immutable `Metamodel`; every descriptor knows its hierarchy root, its
// state-array attribute order and its discriminator mapping.
//
// ============================================================================

pub mod attribute;
pub mod collection;
pub mod entity;
pub mod registry;

pub use attribute::{AttributeKind, AttributeMapping, EmbeddableDescriptor};
pub use collection::{CollectionDescriptor, CollectionKind, ElementKind};
pub use entity::{EntityDefinition, EntityDescriptor, IdentifierMapping};
pub use registry::{Metamodel, MetamodelBuilder};

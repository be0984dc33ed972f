use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use super::assembler::{AttributeAssembler, BasicAssembler, ResultAssembler};
use super::circular::CircularFetchAssembler;
use super::collection::{CollectionInitializer, CollectionOwner};
use super::embedded::EmbeddableInitializer;
use super::entity::EntityInitializer;
use super::initializer::Initializer;
use super::reader::RowReader;
use super::transformer::{RowTransformer, TransformerRegistry};
use crate::core::{DataType, LoadError, NavigablePath, Result, Value};
use crate::metamodel::{
    AttributeKind, AttributeMapping, CollectionDescriptor, ElementKind, EmbeddableDescriptor, EntityDescriptor,
    Metamodel,
};
use crate::session::LockMode;

// ============================================================================
// Shape description
// ============================================================================

/// How one attribute is read from the row.
#[derive(Debug, Clone)]
pub enum FetchSpec {
    Column(usize),
    Embedded(EmbeddedSpec),
    /// To-one whose columns are joined into the row
    Joined(Box<EntityResultSpec>),
    /// To-one known only by its key columns
    Select(Vec<usize>),
    Collection(CollectionFetchSpec),
}

/// Column mapping of a composite value.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSpec {
    fetches: Vec<(String, FetchSpec)>,
}

impl EmbeddedSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(self, attribute: impl Into<String>, column: usize) -> Self {
        self.fetch(attribute, FetchSpec::Column(column))
    }

    pub fn embedded(self, attribute: impl Into<String>, spec: EmbeddedSpec) -> Self {
        self.fetch(attribute, FetchSpec::Embedded(spec))
    }

    pub fn join(self, attribute: impl Into<String>, spec: EntityResultSpec) -> Self {
        self.fetch(attribute, FetchSpec::Joined(Box::new(spec)))
    }

    pub fn select(self, attribute: impl Into<String>, key_columns: &[usize]) -> Self {
        self.fetch(attribute, FetchSpec::Select(key_columns.to_vec()))
    }

    pub fn fetch(mut self, attribute: impl Into<String>, fetch: FetchSpec) -> Self {
        self.fetches.push((attribute.into(), fetch));
        self
    }
}

/// An entity read from the row, either as a result or as a joined fetch.
#[derive(Debug, Clone)]
pub struct EntityResultSpec {
    alias: String,
    entity: String,
    id_columns: Vec<usize>,
    discriminator: Option<usize>,
    row_id: Option<usize>,
    fetches: Vec<(String, FetchSpec)>,
    lock_mode: LockMode,
}

impl EntityResultSpec {
    pub fn new(alias: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            entity: entity.into(),
            id_columns: Vec::new(),
            discriminator: None,
            row_id: None,
            fetches: Vec::new(),
            lock_mode: LockMode::None,
        }
    }

    pub fn id(mut self, column: usize) -> Self {
        self.id_columns = vec![column];
        self
    }

    pub fn composite_id(mut self, columns: &[usize]) -> Self {
        self.id_columns = columns.to_vec();
        self
    }

    pub fn discriminator(mut self, column: usize) -> Self {
        self.discriminator = Some(column);
        self
    }

    pub fn row_id(mut self, column: usize) -> Self {
        self.row_id = Some(column);
        self
    }

    pub fn lock_mode(mut self, lock_mode: LockMode) -> Self {
        self.lock_mode = lock_mode;
        self
    }

    pub fn column(self, attribute: impl Into<String>, column: usize) -> Self {
        self.fetch(attribute, FetchSpec::Column(column))
    }

    pub fn embedded(self, attribute: impl Into<String>, spec: EmbeddedSpec) -> Self {
        self.fetch(attribute, FetchSpec::Embedded(spec))
    }

    pub fn join(self, attribute: impl Into<String>, spec: EntityResultSpec) -> Self {
        self.fetch(attribute, FetchSpec::Joined(Box::new(spec)))
    }

    pub fn select(self, attribute: impl Into<String>, key_columns: &[usize]) -> Self {
        self.fetch(attribute, FetchSpec::Select(key_columns.to_vec()))
    }

    pub fn collection(self, attribute: impl Into<String>, spec: CollectionFetchSpec) -> Self {
        self.fetch(attribute, FetchSpec::Collection(spec))
    }

    pub fn fetch(mut self, attribute: impl Into<String>, fetch: FetchSpec) -> Self {
        self.fetches.push((attribute.into(), fetch));
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }
}

/// How each element row of a collection is read.
#[derive(Debug, Clone)]
pub enum ElementSpec {
    Column(usize),
    Embedded(EmbeddedSpec),
    /// Element entity joined into the row
    Entity(Box<EntityResultSpec>),
    /// Element entity known only by key
    Reference(Vec<usize>),
}

impl ElementSpec {
    pub fn entity(spec: EntityResultSpec) -> Self {
        Self::Entity(Box::new(spec))
    }

    pub fn reference(key_columns: &[usize]) -> Self {
        Self::Reference(key_columns.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct CollectionFetchSpec {
    index_column: Option<usize>,
    element: ElementSpec,
}

impl CollectionFetchSpec {
    pub fn new(element: ElementSpec) -> Self {
        Self {
            index_column: None,
            element,
        }
    }

    /// List position or map key column
    pub fn index(mut self, column: usize) -> Self {
        self.index_column = Some(column);
        self
    }
}

/// A collection selected on its own, keyed by owner columns.
#[derive(Debug, Clone)]
pub struct CollectionResultSpec {
    alias: String,
    role: String,
    key_columns: Vec<usize>,
    index_column: Option<usize>,
    element: ElementSpec,
}

impl CollectionResultSpec {
    pub fn new(alias: impl Into<String>, role: impl Into<String>, key_columns: &[usize], element: ElementSpec) -> Self {
        Self {
            alias: alias.into(),
            role: role.into(),
            key_columns: key_columns.to_vec(),
            index_column: None,
            element,
        }
    }

    pub fn index(mut self, column: usize) -> Self {
        self.index_column = Some(column);
        self
    }
}

#[derive(Debug, Clone)]
enum ResultSpec {
    Entity(EntityResultSpec),
    Scalar {
        alias: String,
        column: usize,
        data_type: DataType,
    },
    Collection(CollectionResultSpec),
}

impl ResultSpec {
    fn alias(&self) -> &str {
        match self {
            Self::Entity(spec) => &spec.alias,
            Self::Scalar { alias, .. } => alias,
            Self::Collection(spec) => &spec.alias,
        }
    }
}

/// Declarative description of what each row of a result set holds.
/// Compiled once into a [`RowReader`].
#[derive(Clone, Default)]
pub struct ResultShape {
    results: Vec<ResultSpec>,
    transformer: Option<String>,
    custom_transformer: Option<Arc<dyn RowTransformer>>,
}

impl ResultShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, spec: EntityResultSpec) -> Self {
        self.results.push(ResultSpec::Entity(spec));
        self
    }

    pub fn scalar(mut self, alias: impl Into<String>, column: usize, data_type: DataType) -> Self {
        self.results.push(ResultSpec::Scalar {
            alias: alias.into(),
            column,
            data_type,
        });
        self
    }

    pub fn collection(mut self, spec: CollectionResultSpec) -> Self {
        self.results.push(ResultSpec::Collection(spec));
        self
    }

    /// Row transformer looked up by name at compile time. Defaults to
    /// `single` for one result and `identity` otherwise.
    pub fn transformer(mut self, name: impl Into<String>) -> Self {
        self.transformer = Some(name.into());
        self
    }

    pub fn transformer_instance(mut self, transformer: Arc<dyn RowTransformer>) -> Self {
        self.custom_transformer = Some(transformer);
        self
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn compile(&self, metamodel: &Metamodel, transformers: &TransformerRegistry) -> Result<RowReader> {
        if self.results.is_empty() {
            return Err(LoadError::InvalidShape("Result shape has no results".to_string()));
        }

        let transformer = match (&self.custom_transformer, &self.transformer) {
            (Some(custom), _) => custom.clone(),
            (None, Some(name)) => transformers.get(name)?,
            (None, None) if self.results.len() == 1 => transformers.get("single")?,
            (None, None) => transformers.get("identity")?,
        };

        let mut compiler = ShapeCompiler::new(metamodel);
        let mut result_assemblers = Vec::with_capacity(self.results.len());
        let mut aliases = Vec::with_capacity(self.results.len());
        for result in &self.results {
            if aliases.iter().any(|a: &String| a == result.alias()) {
                return Err(LoadError::InvalidShape(format!("Duplicate result alias '{}'", result.alias())));
            }
            aliases.push(result.alias().to_string());
            result_assemblers.push(compiler.compile_result(result)?);
        }

        let (initializers, path_index) = compiler.finish()?;
        debug!(
            "Compiled result shape: {} results, {} initializers, transformer '{}'",
            aliases.len(),
            initializers.len(),
            transformer.name()
        );
        Ok(RowReader::new(initializers, path_index, result_assemblers, aliases, transformer))
    }
}

impl std::fmt::Debug for ResultShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultShape")
            .field("results", &self.results)
            .field("transformer", &self.transformer)
            .finish()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// An entity initializer on the path being compiled.
struct Ancestor {
    initializer: usize,
    path: NavigablePath,
    descriptor: Arc<EntityDescriptor>,
}

struct ShapeCompiler<'m> {
    metamodel: &'m Metamodel,
    initializers: Vec<Option<Initializer>>,
    path_index: HashMap<NavigablePath, usize>,
    ancestors: Vec<Ancestor>,
}

impl<'m> ShapeCompiler<'m> {
    fn new(metamodel: &'m Metamodel) -> Self {
        Self {
            metamodel,
            initializers: Vec::new(),
            path_index: HashMap::new(),
            ancestors: Vec::new(),
        }
    }

    fn reserve(&mut self, path: &NavigablePath) -> Result<usize> {
        if self.path_index.contains_key(path) {
            return Err(LoadError::InvalidShape(format!("Path '{}' is fetched twice", path)));
        }
        let idx = self.initializers.len();
        self.initializers.push(None);
        self.path_index.insert(path.clone(), idx);
        Ok(idx)
    }

    fn finish(self) -> Result<(Vec<Initializer>, HashMap<NavigablePath, usize>)> {
        let initializers = self
            .initializers
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| LoadError::IllegalState(format!("Initializer {} was never built", idx)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((initializers, self.path_index))
    }

    fn compile_result(&mut self, result: &ResultSpec) -> Result<ResultAssembler> {
        match result {
            ResultSpec::Entity(spec) => {
                let path = NavigablePath::root(&spec.alias);
                let initializer = self.compile_entity(&path, spec)?;
                Ok(ResultAssembler::Entity { initializer })
            }
            ResultSpec::Scalar { column, data_type, .. } => {
                Ok(ResultAssembler::Scalar(BasicAssembler::new(*column, *data_type)))
            }
            ResultSpec::Collection(spec) => {
                let descriptor = self.metamodel.collection(&spec.role)?.clone();
                let owner = self.metamodel.entity(descriptor.owner_entity_name())?.clone();
                let key = typed_columns(&spec.key_columns, owner.identifier().types(), owner.name())?;
                let path = NavigablePath::root(&spec.alias);
                let initializer = self.compile_collection(
                    &path,
                    descriptor,
                    CollectionOwner::KeyColumns(key),
                    spec.index_column,
                    &spec.element,
                )?;
                Ok(ResultAssembler::Collection { initializer })
            }
        }
    }

    fn compile_entity(&mut self, path: &NavigablePath, spec: &EntityResultSpec) -> Result<usize> {
        let descriptor = self.metamodel.entity(&spec.entity)?.clone();
        let idx = self.reserve(path)?;

        let identifier = typed_columns(&spec.id_columns, descriptor.identifier().types(), descriptor.name())?;
        let concrete_types = self.metamodel.hierarchy_below(&descriptor);
        let discriminator = match spec.discriminator {
            Some(column) => Some(BasicAssembler::new(column, self.discriminator_type(&descriptor)?)),
            None => None,
        };
        let row_id = spec.row_id.map(|column| BasicAssembler::new(column, DataType::Text));

        self.ancestors.push(Ancestor {
            initializer: idx,
            path: path.clone(),
            descriptor: descriptor.clone(),
        });
        let compiled = self.compile_entity_fetches(idx, path, &descriptor, &concrete_types, &spec.fetches);
        self.ancestors.pop();
        let compiled = compiled?;

        let mut assemblers = HashMap::with_capacity(concrete_types.len());
        for (name, concrete) in &concrete_types {
            let mut state = Vec::with_capacity(concrete.attributes().len());
            for attribute in concrete.attributes() {
                let assembler = match compiled.get(attribute.name()) {
                    Some(assembler) => assembler.clone(),
                    None => self.unmapped_attribute(concrete, attribute)?,
                };
                state.push(assembler);
            }
            assemblers.insert(name.clone(), state);
        }

        trace!("Entity initializer {} at {} for {}", idx, path, descriptor.name());
        self.initializers[idx] = Some(Initializer::Entity(EntityInitializer::new(
            path.clone(),
            descriptor,
            identifier,
            discriminator,
            row_id,
            concrete_types,
            assemblers,
            spec.lock_mode,
        )));
        Ok(idx)
    }

    fn compile_entity_fetches(
        &mut self,
        owner: usize,
        path: &NavigablePath,
        descriptor: &EntityDescriptor,
        concrete_types: &HashMap<String, Arc<EntityDescriptor>>,
        fetches: &[(String, FetchSpec)],
    ) -> Result<HashMap<String, AttributeAssembler>> {
        let mut compiled = HashMap::with_capacity(fetches.len());
        for (name, fetch) in fetches {
            // subtype attributes may be fetched through the declared type
            let attribute = descriptor
                .attribute(name)
                .or_else(|| concrete_types.values().find_map(|c| c.attribute(name)))
                .cloned()
                .ok_or_else(|| LoadError::UnknownAttribute {
                    entity: descriptor.name().to_string(),
                    attribute: name.clone(),
                })?;
            let assembler = self.compile_fetch(Some(owner), path, descriptor.name(), &attribute, fetch)?;
            compiled.insert(name.clone(), assembler);
        }
        Ok(compiled)
    }

    /// Attributes left out of the shape: collections become lazy, anything
    /// else makes the shape incomplete.
    fn unmapped_attribute(&self, concrete: &EntityDescriptor, attribute: &AttributeMapping) -> Result<AttributeAssembler> {
        match attribute.kind() {
            AttributeKind::Collection { role } => Ok(AttributeAssembler::Collection {
                descriptor: self.metamodel.collection(role)?.clone(),
                initializer: None,
            }),
            _ => Err(LoadError::InvalidShape(format!(
                "Attribute '{}' of {} is not mapped to a column",
                attribute.name(),
                concrete.name()
            ))),
        }
    }

    fn compile_fetch(
        &mut self,
        owner: Option<usize>,
        path: &NavigablePath,
        container: &str,
        attribute: &AttributeMapping,
        fetch: &FetchSpec,
    ) -> Result<AttributeAssembler> {
        let mismatch = || {
            LoadError::InvalidShape(format!(
                "Fetch {:?} does not fit attribute '{}' of {}",
                fetch,
                attribute.name(),
                container
            ))
        };
        let fetch_path = path.append(attribute.name());

        match (attribute.kind(), fetch) {
            (AttributeKind::Basic(data_type), FetchSpec::Column(column)) => {
                Ok(AttributeAssembler::Basic(BasicAssembler::new(*column, *data_type)))
            }
            (AttributeKind::Embedded(embeddable), FetchSpec::Embedded(spec)) => {
                let initializer = self.compile_embeddable(&fetch_path, embeddable.clone(), spec)?;
                Ok(AttributeAssembler::Embedded { initializer })
            }
            (AttributeKind::ToOne { target }, FetchSpec::Joined(spec)) => {
                let target = self.metamodel.entity(target)?.clone();
                self.compile_joined_entity(&fetch_path, &target, spec)
            }
            (AttributeKind::ToOne { target }, FetchSpec::Select(columns)) => {
                let target = self.metamodel.entity(target)?.clone();
                let key = typed_columns(columns, target.identifier().types(), target.name())?;
                Ok(AttributeAssembler::SelectEntity { key, target })
            }
            (AttributeKind::Collection { role }, FetchSpec::Collection(spec)) => {
                let owner = owner.ok_or_else(|| {
                    LoadError::InvalidShape(format!("Collection '{}' fetched outside an entity", role))
                })?;
                let descriptor = self.metamodel.collection(role)?.clone();
                let initializer = self.compile_collection(
                    &fetch_path,
                    descriptor.clone(),
                    CollectionOwner::Parent(owner),
                    spec.index_column,
                    &spec.element,
                )?;
                Ok(AttributeAssembler::Collection {
                    descriptor,
                    initializer: Some(initializer),
                })
            }
            _ => Err(mismatch()),
        }
    }

    /// A joined entity fetch, or a circular reference when an entity of the
    /// same hierarchy is already being fetched further up the path.
    fn compile_joined_entity(
        &mut self,
        path: &NavigablePath,
        target: &Arc<EntityDescriptor>,
        spec: &EntityResultSpec,
    ) -> Result<AttributeAssembler> {
        let fetched = self.metamodel.entity(&spec.entity)?.clone();
        if !target.is_type_or_super_type_of(fetched.name()) {
            return Err(LoadError::InvalidShape(format!(
                "{} cannot be fetched where {} is expected",
                fetched.name(),
                target.name()
            )));
        }

        let ancestor = self
            .ancestors
            .iter()
            .rev()
            .find(|a| a.descriptor.root_name() == fetched.root_name());
        if let Some(ancestor) = ancestor {
            let key = if spec.id_columns.is_empty() {
                Vec::new()
            } else {
                typed_columns(&spec.id_columns, fetched.identifier().types(), fetched.name())?
            };
            debug!("Circular fetch at {} bound to {}", path, ancestor.path);
            return Ok(AttributeAssembler::Circular(CircularFetchAssembler::new(
                ancestor.initializer,
                ancestor.path.clone(),
                fetched,
                key,
            )));
        }

        let initializer = self.compile_entity(path, spec)?;
        Ok(AttributeAssembler::JoinedEntity { initializer })
    }

    fn compile_embeddable(&mut self, path: &NavigablePath, descriptor: Arc<EmbeddableDescriptor>, spec: &EmbeddedSpec) -> Result<usize> {
        let idx = self.reserve(path)?;

        for (name, _) in &spec.fetches {
            if descriptor.attribute_index(name).is_none() {
                return Err(LoadError::UnknownAttribute {
                    entity: descriptor.name().to_string(),
                    attribute: name.clone(),
                });
            }
        }

        let mut assemblers = Vec::with_capacity(descriptor.attributes().len());
        for attribute in descriptor.attributes() {
            let fetch = spec
                .fetches
                .iter()
                .find(|(name, _)| name == attribute.name())
                .map(|(_, fetch)| fetch)
                .ok_or_else(|| {
                    LoadError::InvalidShape(format!(
                        "Attribute '{}' of {} is not mapped to a column",
                        attribute.name(),
                        descriptor.name()
                    ))
                })?;
            assemblers.push(self.compile_fetch(None, path, descriptor.name(), attribute, fetch)?);
        }

        let mut null_columns: Vec<usize> = assemblers
            .iter()
            .flat_map(|a| a.null_check_columns(&self.initializers))
            .collect();
        null_columns.sort_unstable();
        null_columns.dedup();

        self.initializers[idx] = Some(Initializer::Embeddable(EmbeddableInitializer::new(
            path.clone(),
            descriptor,
            assemblers,
            null_columns,
        )));
        Ok(idx)
    }

    fn compile_collection(
        &mut self,
        path: &NavigablePath,
        descriptor: Arc<CollectionDescriptor>,
        owner: CollectionOwner,
        index_column: Option<usize>,
        element: &ElementSpec,
    ) -> Result<usize> {
        let idx = self.reserve(path)?;

        let index = match (descriptor.kind().is_indexed(), index_column) {
            (true, Some(column)) => {
                let data_type = descriptor.index_data_type().ok_or_else(|| {
                    LoadError::InvalidShape(format!("Collection '{}' has no index type", descriptor.role()))
                })?;
                Some(BasicAssembler::new(column, data_type))
            }
            (true, None) => {
                return Err(LoadError::InvalidShape(format!(
                    "Indexed collection '{}' needs an index column",
                    descriptor.role()
                )));
            }
            (false, Some(_)) => {
                return Err(LoadError::InvalidShape(format!(
                    "Collection '{}' is not indexed",
                    descriptor.role()
                )));
            }
            (false, None) => None,
        };

        let element_path = path.element();
        let element = match (descriptor.element(), element) {
            (ElementKind::Basic(data_type), ElementSpec::Column(column)) => {
                AttributeAssembler::Basic(BasicAssembler::new(*column, *data_type))
            }
            (ElementKind::Embedded(embeddable), ElementSpec::Embedded(spec)) => {
                let initializer = self.compile_embeddable(&element_path, embeddable.clone(), spec)?;
                AttributeAssembler::Embedded { initializer }
            }
            (ElementKind::Entity(target), ElementSpec::Entity(spec)) => {
                let target = self.metamodel.entity(target)?.clone();
                self.compile_joined_entity(&element_path, &target, spec)?
            }
            (ElementKind::Entity(target), ElementSpec::Reference(columns)) => {
                let target = self.metamodel.entity(target)?.clone();
                let key = typed_columns(columns, target.identifier().types(), target.name())?;
                AttributeAssembler::SelectEntity { key, target }
            }
            (kind, spec) => {
                return Err(LoadError::InvalidShape(format!(
                    "Element {:?} does not fit collection '{}' of {:?}",
                    spec,
                    descriptor.role(),
                    kind
                )));
            }
        };

        trace!("Collection initializer {} at {} for {}", idx, path, descriptor.role());
        self.initializers[idx] = Some(Initializer::Collection(CollectionInitializer::new(
            path.clone(),
            descriptor,
            owner,
            index,
            element,
        )));
        Ok(idx)
    }

    /// Column type of the discriminator, taken from the values mapped in the
    /// hierarchy.
    fn discriminator_type(&self, descriptor: &EntityDescriptor) -> Result<DataType> {
        let root = self.metamodel.entity(descriptor.root_name())?;
        self.metamodel
            .hierarchy_below(root)
            .values()
            .find_map(|d| d.discriminator_value().and_then(value_type))
            .ok_or_else(|| {
                LoadError::InvalidShape(format!(
                    "{} has a discriminator column but no discriminator values",
                    descriptor.name()
                ))
            })
    }
}

fn value_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Null => None,
        Value::Integer(_) => Some(DataType::Integer),
        Value::Float(_) => Some(DataType::Float),
        Value::Text(_) => Some(DataType::Text),
        Value::Boolean(_) => Some(DataType::Boolean),
    }
}

fn typed_columns(columns: &[usize], types: &[DataType], owner: &str) -> Result<Vec<BasicAssembler>> {
    if columns.len() != types.len() {
        return Err(LoadError::InvalidShape(format!(
            "Key of {} spans {} columns, {} given",
            owner,
            types.len(),
            columns.len()
        )));
    }
    Ok(columns
        .iter()
        .zip(types)
        .map(|(column, data_type)| BasicAssembler::new(*column, *data_type))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::InitializerKind;
    use crate::metamodel::{CollectionKind, EntityDefinition};

    fn metamodel() -> Arc<Metamodel> {
        let address = EmbeddableDescriptor::new("Address")
            .basic("city", DataType::Text)
            .basic("zip", DataType::Text)
            .build();
        Metamodel::builder()
            .entity(
                EntityDefinition::new("Employee")
                    .identifier("id", DataType::Integer)
                    .basic("name", DataType::Text)
                    .embedded("address", address)
                    .to_one("manager", "Employee")
                    .collection("tags", "Employee.tags"),
            )
            .collection(CollectionDescriptor::new(
                "Employee.tags",
                "Employee",
                CollectionKind::List,
                ElementKind::Basic(DataType::Text),
            ))
            .build()
            .unwrap()
    }

    fn employee(alias: &str, id: usize) -> EntityResultSpec {
        EntityResultSpec::new(alias, "Employee")
            .id(id)
            .column("name", id + 1)
            .embedded("address", EmbeddedSpec::new().column("city", id + 2).column("zip", id + 3))
    }

    #[test]
    fn test_self_reference_compiles_to_one_initializer() {
        let metamodel = metamodel();
        let shape = ResultShape::new().entity(employee("e", 0).join("manager", employee("m", 4)));
        let reader = shape.compile(&metamodel, &TransformerRegistry::default()).unwrap();

        assert_eq!(reader.count_of(InitializerKind::Entity), 1);
        assert_eq!(reader.count_of(InitializerKind::Embeddable), 1);
        assert!(reader.initializer_for(&NavigablePath::root("e").append("manager")).is_none());
    }

    #[test]
    fn test_unmapped_basic_attribute_is_rejected() {
        let metamodel = metamodel();
        let shape = ResultShape::new().entity(EntityResultSpec::new("e", "Employee").id(0).select("manager", &[1]));
        let err = shape.compile(&metamodel, &TransformerRegistry::default()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidShape(_)));
    }

    #[test]
    fn test_unknown_attribute_and_entity() {
        let metamodel = metamodel();
        let registry = TransformerRegistry::default();

        let shape = ResultShape::new().entity(employee("e", 0).select("manager", &[4]).column("salary", 5));
        assert!(matches!(
            shape.compile(&metamodel, &registry),
            Err(LoadError::UnknownAttribute { .. })
        ));

        let shape = ResultShape::new().entity(EntityResultSpec::new("x", "Robot").id(0));
        assert!(matches!(shape.compile(&metamodel, &registry), Err(LoadError::UnknownEntity(_))));
    }

    #[test]
    fn test_list_fetch_needs_index_column() {
        let metamodel = metamodel();
        let registry = TransformerRegistry::default();
        let without_index = employee("e", 0)
            .select("manager", &[4])
            .collection("tags", CollectionFetchSpec::new(ElementSpec::Column(5)));
        assert!(matches!(
            ResultShape::new().entity(without_index).compile(&metamodel, &registry),
            Err(LoadError::InvalidShape(_))
        ));

        let with_index = employee("e", 0)
            .select("manager", &[4])
            .collection("tags", CollectionFetchSpec::new(ElementSpec::Column(5)).index(6));
        let reader = ResultShape::new()
            .entity(with_index)
            .compile(&metamodel, &registry)
            .unwrap();
        assert_eq!(reader.count_of(InitializerKind::Collection), 1);
    }

    #[test]
    fn test_default_transformer_depends_on_result_count() {
        let metamodel = metamodel();
        let registry = TransformerRegistry::default();
        let single = ResultShape::new()
            .scalar("n", 0, DataType::Integer)
            .compile(&metamodel, &registry)
            .unwrap();
        assert_eq!(single.transformer().name(), "single");

        let several = ResultShape::new()
            .scalar("n", 0, DataType::Integer)
            .scalar("m", 1, DataType::Integer)
            .compile(&metamodel, &registry)
            .unwrap();
        assert_eq!(several.transformer().name(), "identity");

        let duplicate = ResultShape::new()
            .scalar("n", 0, DataType::Integer)
            .scalar("n", 1, DataType::Integer);
        assert!(duplicate.compile(&metamodel, &registry).is_err());
    }
}

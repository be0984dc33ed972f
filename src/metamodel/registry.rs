use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    AttributeKind, AttributeMapping, CollectionDescriptor, ElementKind, EmbeddableDescriptor,
    EntityDefinition, EntityDescriptor,
};
use crate::core::{LoadError, Result};

/// Immutable registry of every entity and collection role known to a
/// session factory.
#[derive(Debug, Default)]
pub struct Metamodel {
    entities: HashMap<String, Arc<EntityDescriptor>>,
    collections: HashMap<String, Arc<CollectionDescriptor>>,
}

impl Metamodel {
    pub fn builder() -> MetamodelBuilder {
        MetamodelBuilder::default()
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDescriptor>> {
        self.entities
            .get(name)
            .ok_or_else(|| LoadError::UnknownEntity(name.to_string()))
    }

    pub fn find_entity(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    pub fn collection(&self, role: &str) -> Result<&Arc<CollectionDescriptor>> {
        self.collections
            .get(role)
            .ok_or_else(|| LoadError::UnknownCollectionRole(role.to_string()))
    }

    /// The descriptor itself plus every subtype, keyed by entity name.
    pub fn hierarchy_below(&self, descriptor: &EntityDescriptor) -> HashMap<String, Arc<EntityDescriptor>> {
        descriptor
            .subtypes()
            .filter_map(|name| self.entities.get(name).map(|d| (name.to_string(), d.clone())))
            .collect()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MetamodelBuilder {
    entities: Vec<EntityDefinition>,
    collections: Vec<CollectionDescriptor>,
}

impl MetamodelBuilder {
    pub fn entity(mut self, definition: EntityDefinition) -> Self {
        self.entities.push(definition);
        self
    }

    pub fn collection(mut self, descriptor: CollectionDescriptor) -> Self {
        self.collections.push(descriptor);
        self
    }

    pub fn build(self) -> Result<Arc<Metamodel>> {
        let mut definitions: HashMap<String, EntityDefinition> = HashMap::new();
        for definition in self.entities {
            if definitions.contains_key(&definition.name) {
                return Err(LoadError::InvalidMetamodel(format!(
                    "Entity '{}' declared twice",
                    definition.name
                )));
            }
            definitions.insert(definition.name.clone(), definition);
        }

        let mut chains: HashMap<String, Vec<String>> = HashMap::new();
        for name in definitions.keys() {
            chains.insert(name.clone(), super_chain(name, &definitions)?);
        }

        // subtypes[x] = x plus everything extending it transitively
        let mut subtypes: HashMap<String, HashSet<String>> = HashMap::new();
        for (name, chain) in &chains {
            for ancestor in chain {
                subtypes.entry(ancestor.clone()).or_default().insert(name.clone());
            }
        }

        let mut discriminator_maps: HashMap<String, HashMap<crate::core::Value, String>> = HashMap::new();
        for (name, chain) in &chains {
            let root = &chain[0];
            if let Some(value) = &definitions[name].discriminator_value {
                let map = discriminator_maps.entry(root.clone()).or_default();
                if let Some(previous) = map.insert(value.clone(), name.clone()) {
                    return Err(LoadError::InvalidMetamodel(format!(
                        "Discriminator value {} used by both '{}' and '{}'",
                        value.to_literal(),
                        previous,
                        name
                    )));
                }
            }
        }
        let discriminator_maps: HashMap<String, Arc<HashMap<crate::core::Value, String>>> =
            discriminator_maps.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();

        let mut entities = HashMap::new();
        for (name, chain) in &chains {
            let root = &definitions[&chain[0]];
            let own = &definitions[name];

            if chain.len() > 1 && own.identifier.is_some() {
                return Err(LoadError::InvalidMetamodel(format!(
                    "Subtype '{}' may not redeclare the identifier",
                    name
                )));
            }
            let identifier = root.identifier.clone().ok_or_else(|| {
                LoadError::InvalidMetamodel(format!("Entity '{}' has no identifier", root.name))
            })?;

            let mut attributes: Vec<AttributeMapping> = Vec::new();
            for level in chain {
                for attribute in &definitions[level].attributes {
                    if attributes.iter().any(|a| a.name() == attribute.name()) {
                        return Err(LoadError::InvalidMetamodel(format!(
                            "Attribute '{}' declared twice in hierarchy of '{}'",
                            attribute.name(),
                            name
                        )));
                    }
                    attributes.push(attribute.clone());
                }
            }

            let version_index = match &root.version {
                Some(version) => {
                    let idx = attributes
                        .iter()
                        .position(|a| a.name() == version)
                        .ok_or_else(|| LoadError::UnknownAttribute {
                            entity: name.clone(),
                            attribute: version.clone(),
                        })?;
                    if !matches!(attributes[idx].kind(), AttributeKind::Basic(_)) {
                        return Err(LoadError::InvalidMetamodel(format!(
                            "Version attribute '{}.{}' must be basic",
                            name, version
                        )));
                    }
                    Some(idx)
                }
                None => None,
            };

            let natural_id_indexes = root
                .natural_id
                .iter()
                .map(|attr| {
                    attributes
                        .iter()
                        .position(|a| a.name() == attr)
                        .ok_or_else(|| LoadError::UnknownAttribute {
                            entity: name.clone(),
                            attribute: attr.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let descriptor = EntityDescriptor {
                name: name.clone(),
                root_name: root.name.clone(),
                super_name: own.super_name.clone(),
                identifier,
                attributes,
                discriminator_value: own.discriminator_value.clone(),
                discriminator_map: discriminator_maps
                    .get(&root.name)
                    .cloned()
                    .unwrap_or_default(),
                version_index,
                natural_id_indexes,
                subtypes: subtypes.remove(name).unwrap_or_default(),
                cacheable: root.cacheable,
                batch_size: own.batch_size.max(root.batch_size),
                mutable: root.mutable,
            };
            entities.insert(name.clone(), Arc::new(descriptor));
        }

        let mut collections = HashMap::new();
        for descriptor in self.collections {
            validate_collection(&descriptor, &entities)?;
            if collections
                .insert(descriptor.role().to_string(), Arc::new(descriptor))
                .is_some()
            {
                return Err(LoadError::InvalidMetamodel("Collection role declared twice".into()));
            }
        }

        for descriptor in entities.values() {
            for attribute in descriptor.attributes() {
                validate_attribute(descriptor.name(), attribute, &entities, &collections)?;
            }
        }

        Ok(Arc::new(Metamodel {
            entities,
            collections,
        }))
    }
}

/// Root-first chain of entity names ending with `name`.
fn super_chain(name: &str, definitions: &HashMap<String, EntityDefinition>) -> Result<Vec<String>> {
    let mut chain = vec![name.to_string()];
    let mut current = &definitions[name];
    while let Some(super_name) = &current.super_name {
        if chain.contains(super_name) {
            return Err(LoadError::InvalidMetamodel(format!(
                "Inheritance cycle through '{}'",
                super_name
            )));
        }
        current = definitions
            .get(super_name)
            .ok_or_else(|| LoadError::UnknownEntity(super_name.clone()))?;
        chain.push(super_name.clone());
    }
    chain.reverse();
    Ok(chain)
}

fn validate_collection(
    descriptor: &CollectionDescriptor,
    entities: &HashMap<String, Arc<EntityDescriptor>>,
) -> Result<()> {
    let owner = entities
        .get(descriptor.owner_entity_name())
        .ok_or_else(|| LoadError::UnknownEntity(descriptor.owner_entity_name().to_string()))?;
    if owner.collection_attribute_index(descriptor.role()).is_none() {
        return Err(LoadError::InvalidMetamodel(format!(
            "Owner '{}' has no attribute for collection role '{}'",
            owner.name(),
            descriptor.role()
        )));
    }
    match descriptor.element() {
        ElementKind::Entity(target) if !entities.contains_key(target) => {
            Err(LoadError::UnknownEntity(target.clone()))
        }
        ElementKind::Embedded(embeddable) => validate_embeddable(embeddable, entities),
        _ => Ok(()),
    }
}

fn validate_attribute(
    entity: &str,
    attribute: &AttributeMapping,
    entities: &HashMap<String, Arc<EntityDescriptor>>,
    collections: &HashMap<String, Arc<CollectionDescriptor>>,
) -> Result<()> {
    match attribute.kind() {
        AttributeKind::Basic(_) => Ok(()),
        AttributeKind::ToOne { target } => {
            if entities.contains_key(target) {
                Ok(())
            } else {
                Err(LoadError::UnknownEntity(target.clone()))
            }
        }
        AttributeKind::Collection { role } => {
            if collections.contains_key(role) {
                Ok(())
            } else {
                Err(LoadError::UnknownCollectionRole(format!("{} (on '{}')", role, entity)))
            }
        }
        AttributeKind::Embedded(embeddable) => validate_embeddable(embeddable, entities),
    }
}

fn validate_embeddable(
    embeddable: &EmbeddableDescriptor,
    entities: &HashMap<String, Arc<EntityDescriptor>>,
) -> Result<()> {
    for attribute in embeddable.attributes() {
        match attribute.kind() {
            AttributeKind::Collection { .. } => {
                return Err(LoadError::InvalidMetamodel(format!(
                    "Embeddable '{}' may not own collection '{}'",
                    embeddable.name(),
                    attribute.name()
                )));
            }
            AttributeKind::ToOne { target } if !entities.contains_key(target) => {
                return Err(LoadError::UnknownEntity(target.clone()));
            }
            AttributeKind::Embedded(nested) => validate_embeddable(nested, entities)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};
    use crate::metamodel::CollectionKind;

    fn vehicles() -> Arc<Metamodel> {
        Metamodel::builder()
            .entity(
                EntityDefinition::new("Vehicle")
                    .identifier("id", DataType::Integer)
                    .basic("name", DataType::Text)
                    .basic("version", DataType::Integer)
                    .version("version")
                    .discriminator_value("V"),
            )
            .entity(
                EntityDefinition::new("Car")
                    .extends("Vehicle")
                    .basic("doors", DataType::Integer)
                    .discriminator_value("C"),
            )
            .entity(
                EntityDefinition::new("SportsCar")
                    .extends("Car")
                    .basic("top_speed", DataType::Integer)
                    .discriminator_value("S"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_state_array_puts_inherited_attributes_first() {
        let metamodel = vehicles();
        let sports = metamodel.entity("SportsCar").unwrap();

        let names: Vec<&str> = sports.attributes().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["name", "version", "doors", "top_speed"]);
        assert_eq!(sports.root_name(), "Vehicle");
        assert_eq!(sports.version_index(), Some(1));
    }

    #[test]
    fn test_discriminator_map_is_hierarchy_wide() {
        let metamodel = vehicles();
        let car = metamodel.entity("Car").unwrap();

        assert_eq!(car.subclass_for_discriminator(&Value::from("S")), Some("SportsCar"));
        assert_eq!(car.subclass_for_discriminator(&Value::from("Q")), None);
        assert!(car.is_type_or_super_type_of("SportsCar"));
        assert!(!car.is_type_or_super_type_of("Vehicle"));
        assert_eq!(metamodel.hierarchy_below(car).len(), 2);
    }

    #[test]
    fn test_unknown_super_type_rejected() {
        let result = Metamodel::builder()
            .entity(EntityDefinition::new("Car").extends("Missing"))
            .build();
        assert!(matches!(result, Err(LoadError::UnknownEntity(name)) if name == "Missing"));
    }

    #[test]
    fn test_collection_role_requires_owner_attribute() {
        let result = Metamodel::builder()
            .entity(EntityDefinition::new("Customer").identifier("id", DataType::Integer))
            .collection(CollectionDescriptor::new(
                "Customer.tags",
                "Customer",
                CollectionKind::Set,
                ElementKind::Basic(DataType::Text),
            ))
            .build();
        assert!(matches!(result, Err(LoadError::InvalidMetamodel(_))));
    }

    #[test]
    fn test_duplicate_discriminator_rejected() {
        let result = Metamodel::builder()
            .entity(
                EntityDefinition::new("A")
                    .identifier("id", DataType::Integer)
                    .discriminator_value("X"),
            )
            .entity(EntityDefinition::new("B").extends("A").discriminator_value("X"))
            .build();
        assert!(matches!(result, Err(LoadError::InvalidMetamodel(_))));
    }
}

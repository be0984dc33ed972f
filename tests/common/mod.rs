#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use graphload::cache::{CacheItem, CacheKey, CacheRegion, LockToken};
use graphload::metamodel::AttributeMapping;
use graphload::session::{LoadEvent, LoadEventKind};
use graphload::{
    AttributeValue, CacheRegionConfig, CollectionDescriptor, CollectionFetchSpec, CollectionKind, DataType,
    ElementKind, ElementSpec, EmbeddableDescriptor, EmbeddedSpec, EntityDefinition, EntityRef, EntityResultSpec,
    LoadError, LoadEventListener, LruCacheRegion, Metamodel, Result, ResultShape, Session, SessionConfig, Value,
};

pub fn metamodel() -> Arc<Metamodel> {
    let address = EmbeddableDescriptor::new("Address")
        .basic("street", DataType::Text)
        .basic("city", DataType::Text)
        .build();

    Metamodel::builder()
        .entity(
            EntityDefinition::new("Customer")
                .identifier("id", DataType::Integer)
                .attribute(AttributeMapping::basic("name", DataType::Text).not_null())
                .basic("email", DataType::Text)
                .basic("version", DataType::Integer)
                .embedded("address", address)
                .collection("orders", "Customer.orders")
                .version("version")
                .natural_id(&["email"])
                .cacheable(true),
        )
        .entity(
            EntityDefinition::new("Order")
                .identifier("id", DataType::Integer)
                .basic("total", DataType::Integer)
                .to_one("customer", "Customer")
                .cacheable(true),
        )
        .collection(
            CollectionDescriptor::new(
                "Customer.orders",
                "Customer",
                CollectionKind::Bag,
                ElementKind::Entity("Order".to_string()),
            )
            .cacheable(true),
        )
        .entity(
            EntityDefinition::new("Employee")
                .identifier("id", DataType::Integer)
                .basic("name", DataType::Text)
                .to_one("manager", "Employee")
                .collection("reports", "Employee.reports"),
        )
        .collection(CollectionDescriptor::new(
            "Employee.reports",
            "Employee",
            CollectionKind::Bag,
            ElementKind::Entity("Employee".to_string()),
        ))
        .entity(
            EntityDefinition::new("Vehicle")
                .identifier("id", DataType::Integer)
                .basic("plate", DataType::Text)
                .discriminator_value("V")
                .cacheable(true),
        )
        .entity(
            EntityDefinition::new("Car")
                .extends("Vehicle")
                .basic("doors", DataType::Integer)
                .discriminator_value("C"),
        )
        .entity(
            EntityDefinition::new("Truck")
                .extends("Vehicle")
                .basic("payload", DataType::Integer)
                .discriminator_value("T"),
        )
        .entity(
            EntityDefinition::new("Playlist")
                .identifier("id", DataType::Integer)
                .basic("name", DataType::Text)
                .collection("tracks", "Playlist.tracks")
                .collection("ratings", "Playlist.ratings"),
        )
        .collection(CollectionDescriptor::new(
            "Playlist.tracks",
            "Playlist",
            CollectionKind::Array,
            ElementKind::Basic(DataType::Text),
        ))
        .collection(
            CollectionDescriptor::new(
                "Playlist.ratings",
                "Playlist",
                CollectionKind::Map,
                ElementKind::Basic(DataType::Integer),
            )
            .index_type(DataType::Text),
        )
        .build()
        .unwrap()
}

// ----------------------------------------------------------------------------
// Customer / Order
// ----------------------------------------------------------------------------

/// Columns: id, name, email, version, street, city, order id, order total
pub fn customer_spec() -> EntityResultSpec {
    EntityResultSpec::new("c", "Customer")
        .id(0)
        .column("name", 1)
        .column("email", 2)
        .column("version", 3)
        .embedded("address", EmbeddedSpec::new().column("street", 4).column("city", 5))
        .collection(
            "orders",
            CollectionFetchSpec::new(ElementSpec::entity(
                EntityResultSpec::new("o", "Order")
                    .id(6)
                    .column("total", 7)
                    .select("customer", &[0]),
            )),
        )
}

pub fn customer_shape() -> ResultShape {
    ResultShape::new().entity(customer_spec())
}

pub fn customer_row(id: i64, name: &str, order: Option<(i64, i64)>) -> Vec<Value> {
    customer_row_versioned(id, name, 1, order)
}

pub fn customer_row_versioned(id: i64, name: &str, version: i64, order: Option<(i64, i64)>) -> Vec<Value> {
    let (order_id, total) = match order {
        Some((order_id, total)) => (Value::Integer(order_id), Value::Integer(total)),
        None => (Value::Null, Value::Null),
    };
    vec![
        Value::Integer(id),
        Value::Text(name.to_string()),
        Value::Text(format!("{}@example.com", name.to_lowercase())),
        Value::Integer(version),
        Value::Text("1 Main St".to_string()),
        Value::Text("Springfield".to_string()),
        order_id,
        total,
    ]
}

// ----------------------------------------------------------------------------
// Vehicles
// ----------------------------------------------------------------------------

/// Columns: id, discriminator, plate, doors, payload
pub fn vehicle_shape() -> ResultShape {
    ResultShape::new().entity(
        EntityResultSpec::new("v", "Vehicle")
            .id(0)
            .discriminator(1)
            .column("plate", 2)
            .column("doors", 3)
            .column("payload", 4),
    )
}

pub fn vehicle_row(id: i64, discriminator: &str, plate: &str, doors: Option<i64>, payload: Option<i64>) -> Vec<Value> {
    vec![
        Value::Integer(id),
        Value::Text(discriminator.to_string()),
        Value::Text(plate.to_string()),
        doors.into(),
        payload.into(),
    ]
}

// ----------------------------------------------------------------------------
// Sessions and accessors
// ----------------------------------------------------------------------------

pub fn lru_region() -> Arc<LruCacheRegion> {
    Arc::new(LruCacheRegion::new(CacheRegionConfig::new("test")).unwrap())
}

pub fn cached_session(metamodel: &Arc<Metamodel>, region: Arc<dyn CacheRegion>) -> Session {
    cached_session_with(metamodel, region, SessionConfig::default())
}

pub fn cached_session_with(metamodel: &Arc<Metamodel>, region: Arc<dyn CacheRegion>, config: SessionConfig) -> Session {
    Session::builder(metamodel.clone())
        .config(config)
        .cache_region(region)
        .build()
        .unwrap()
}

pub fn attr(entity: &EntityRef, name: &str) -> AttributeValue {
    entity.get(name).unwrap().unwrap_or_else(AttributeValue::null)
}

pub fn text(entity: &EntityRef, name: &str) -> String {
    attr(entity, name)
        .as_value()
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

pub fn int(entity: &EntityRef, name: &str) -> Option<i64> {
    attr(entity, name).as_value().and_then(Value::as_i64)
}

// ----------------------------------------------------------------------------
// Test doubles
// ----------------------------------------------------------------------------

/// Records every load event as (kind, entity, from cache).
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(LoadEventKind, String, bool)>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<(LoadEventKind, String, bool)> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &LoadEvent) {
        self.events
            .lock()
            .unwrap()
            .push((event.kind, event.entity_name.clone(), event.from_cache));
    }
}

impl LoadEventListener for RecordingListener {
    fn on_pre_load(&self, event: &LoadEvent) -> Result<()> {
        self.record(event);
        Ok(())
    }

    fn on_post_load(&self, event: &LoadEvent) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

/// Region whose backend is always down.
pub struct FailingRegion;

impl FailingRegion {
    fn offline<T>() -> Result<T> {
        Err(LoadError::Cache("region offline".to_string()))
    }
}

impl CacheRegion for FailingRegion {
    fn name(&self) -> &str {
        "failing"
    }

    fn get(&self, _key: &CacheKey) -> Result<Option<CacheItem>> {
        Self::offline()
    }

    fn put(&self, _key: CacheKey, _item: CacheItem) -> Result<()> {
        Self::offline()
    }

    fn contains(&self, _key: &CacheKey) -> Result<bool> {
        Self::offline()
    }

    fn evict(&self, _key: &CacheKey) -> Result<()> {
        Self::offline()
    }

    fn lock(&self, _key: &CacheKey) -> Result<LockToken> {
        Self::offline()
    }

    fn unlock(&self, _token: LockToken) -> Result<()> {
        Self::offline()
    }

    fn is_locked(&self, _key: &CacheKey) -> Result<bool> {
        Self::offline()
    }

    fn clear(&self) -> Result<()> {
        Self::offline()
    }
}

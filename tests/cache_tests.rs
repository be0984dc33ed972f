/// Second-level cache tests
///
/// Entities, collections and natural-id resolutions written on load and
/// served to later sessions; region failures degrade to misses.
/// Run with: cargo test --test cache_tests

mod common;

use std::sync::Arc;

use common::*;
use graphload::cache::CacheRegion;
use graphload::session::{LoadEventKind, RoleFilter};
use graphload::{
    CacheBridge, CacheMode, CollectionKey, EmbeddedSpec, EntityKey, EntityResultSpec, Identifier, LoadError,
    ProcessingOptions, ResultShape, Session, SessionConfig, Value, VecRowSource,
};

fn load_rows(session: &mut Session, shape: &graphload::ResultShape, rows: Vec<Vec<Value>>) -> graphload::LoadResult {
    let mut source = VecRowSource::from_rows(rows);
    graphload::load(shape, &mut source, session, &ProcessingOptions::default()).unwrap()
}

fn customer_key(id: i64) -> graphload::cache::CacheKey {
    CacheBridge::entity_cache_key(&EntityKey::new(Identifier::from(id), "Customer"), None)
}

fn orders_key(owner: i64) -> graphload::cache::CacheKey {
    CacheBridge::collection_cache_key(&CollectionKey::new("Customer.orders", Identifier::from(owner)), None)
}

#[test]
fn test_loaded_state_served_to_next_session() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))]);

    assert!(region.contains(&customer_key(1)).unwrap());
    assert!(region.contains(&orders_key(1)).unwrap());

    let listener = Arc::new(RecordingListener::default());
    let mut reader = Session::builder(metamodel.clone())
        .cache_region(region.clone())
        .listener(listener.clone())
        .build()
        .unwrap();
    let customer = reader.get("Customer", 1).unwrap().unwrap();
    assert_eq!(text(&customer, "name"), "Ann");
    assert_eq!(
        listener.events(),
        vec![
            (LoadEventKind::PreLoad, "Customer".to_string(), true),
            (LoadEventKind::PostLoad, "Customer".to_string(), true),
        ]
    );
    let key = EntityKey::new(Identifier::from(1), "Customer");
    assert_eq!(reader.persistence_context().entry(&key).unwrap().version, Some(Value::Integer(1)));

    let orders = attr(&customer, "orders").as_collection().unwrap().clone();
    assert!(!orders.is_initialized().unwrap());
    assert!(reader.initialize_collection_from_cache(&orders).unwrap());
    assert_eq!(orders.len().unwrap(), 1);

    let order = orders.values().unwrap()[0].as_entity().unwrap().clone();
    assert!(!order.is_initialized().unwrap());
    let fetched = reader.get("Order", 10).unwrap().unwrap();
    assert!(fetched.ptr_eq(&order));
    assert_eq!(int(&order, "total"), Some(100));
}

#[test]
fn test_cache_hit_wins_over_row_data() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row(1, "Ann", None)]);

    let mut reader = cached_session(&metamodel, region);
    let result = load_rows(&mut reader, &customer_shape(), vec![customer_row(1, "Annie", None)]);
    assert_eq!(text(&result.entities()[0], "name"), "Ann");
}

#[test]
fn test_failing_region_is_a_miss() {
    let metamodel = metamodel();
    let mut session = cached_session(&metamodel, Arc::new(FailingRegion));

    let result = load_rows(&mut session, &customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))]);
    assert_eq!(text(&result.entities()[0], "name"), "Ann");
    assert!(session.get("Customer", 2).unwrap().is_none());
}

#[test]
fn test_locked_key_declines_put() {
    let metamodel = metamodel();
    let region = lru_region();
    let token = region.lock(&customer_key(1)).unwrap();

    let mut session = cached_session(&metamodel, region.clone());
    load_rows(&mut session, &customer_shape(), vec![customer_row(1, "Ann", None)]);
    assert!(!region.contains(&customer_key(1)).unwrap());

    region.unlock(token).unwrap();
    let mut session = cached_session(&metamodel, region.clone());
    load_rows(&mut session, &customer_shape(), vec![customer_row(1, "Ann", None)]);
    assert!(region.contains(&customer_key(1)).unwrap());
}

#[test]
fn test_ignore_mode_neither_reads_nor_writes() {
    let metamodel = metamodel();
    let region = lru_region();
    let config = SessionConfig::new().cache_mode(CacheMode::Ignore);
    let mut session = cached_session_with(&metamodel, region.clone(), config);

    load_rows(&mut session, &customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))]);
    assert!(region.is_empty().unwrap());
}

#[test]
fn test_newer_cached_version_is_kept() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row_versioned(1, "Ann", 2, None)]);

    let config = SessionConfig::new().cache_mode(CacheMode::Put);
    let mut stale = cached_session_with(&metamodel, region.clone(), config);
    load_rows(&mut stale, &customer_shape(), vec![customer_row_versioned(1, "Ann", 1, None)]);

    let item = region.get(&customer_key(1)).unwrap().unwrap();
    assert_eq!(item.version, Some(Value::Integer(2)));
}

#[test]
fn test_filtered_collection_not_cached() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut session = Session::builder(metamodel.clone())
        .cache_region(region.clone())
        .filter(Arc::new(RoleFilter::new("recent", &["Customer.orders"])))
        .build()
        .unwrap();

    load_rows(&mut session, &customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))]);
    assert!(region.contains(&customer_key(1)).unwrap());
    assert!(!region.contains(&orders_key(1)).unwrap());
}

#[test]
fn test_natural_id_resolution_shared_through_cache() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row(7, "Ann", None)]);

    let reader = cached_session(&metamodel, region);
    let natural_id = [Value::from("ann@example.com")];
    assert_eq!(
        reader.resolve_natural_id("Customer", &natural_id).unwrap(),
        Some(Identifier::from(7))
    );
    assert!(reader
        .resolve_natural_id("Customer", &[Value::from("bob@example.com")])
        .unwrap()
        .is_none());
}

#[test]
fn test_structured_entries_are_json() {
    let metamodel = metamodel();
    let region = lru_region();
    let config = SessionConfig::new().structured_entries(true);
    let mut writer = cached_session_with(&metamodel, region.clone(), config.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row(1, "Ann", None)]);

    let item = region.get(&customer_key(1)).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&item.payload).unwrap();
    assert!(json.is_object());

    let mut reader = cached_session_with(&metamodel, region, config);
    let customer = reader.get("Customer", 1).unwrap().unwrap();
    assert_eq!(text(&customer, "email"), "ann@example.com");
}

#[test]
fn test_cached_subclass_outside_requested_type() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &vehicle_shape(), vec![vehicle_row(1, "C", "CAR-1", Some(4), None)]);

    let mut reader = cached_session(&metamodel, region.clone());
    let err = reader.get("Truck", 1).unwrap_err();
    assert!(matches!(err, LoadError::WrongClass { .. }));

    let mut reader = cached_session(&metamodel, region);
    let vehicle = reader.get("Vehicle", 1).unwrap().unwrap();
    assert_eq!(vehicle.entity_name().unwrap(), "Car");
    assert_eq!(int(&vehicle, "doors"), Some(4));
}

#[test]
fn test_cached_reference_to_entity_loading_in_same_row() {
    let metamodel = metamodel();
    let region = lru_region();

    // Order#10 alone, customer by foreign key: id, total, customer id
    let orders = ResultShape::new().entity(
        EntityResultSpec::new("o", "Order")
            .id(0)
            .column("total", 1)
            .select("customer", &[2]),
    );
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &orders, vec![vec![Value::Integer(10), Value::Integer(100), Value::Integer(1)]]);
    let order_key = CacheBridge::entity_cache_key(&EntityKey::new(Identifier::from(10), "Order"), None);
    assert!(region.contains(&order_key).unwrap());
    assert!(!region.contains(&customer_key(1)).unwrap());

    // customer and its order side by side, the order served from the cache
    let shape = ResultShape::new()
        .entity(
            EntityResultSpec::new("c", "Customer")
                .id(0)
                .column("name", 1)
                .column("email", 2)
                .column("version", 3)
                .embedded("address", EmbeddedSpec::new().column("street", 4).column("city", 5)),
        )
        .entity(
            EntityResultSpec::new("o", "Order")
                .id(6)
                .column("total", 7)
                .select("customer", &[0]),
        );
    let mut reader = cached_session(&metamodel, region);
    let result = load_rows(&mut reader, &shape, vec![customer_row(1, "Ann", Some((10, 999)))]);
    let row = result.rows()[0].as_list().unwrap();
    let customer = row[0].as_entity().unwrap().clone();
    let order = row[1].as_entity().unwrap().clone();

    assert_eq!(int(&order, "total"), Some(100));
    let linked = attr(&order, "customer").as_entity().unwrap().clone();
    assert!(linked.ptr_eq(&customer));
    assert!(linked.is_initialized().unwrap());
    assert!(reader.get("Customer", 1).unwrap().unwrap().ptr_eq(&customer));
    assert_eq!(reader.persistence_context().proxy_count(), 0);
}

#[test]
fn test_entity_inserted_in_transaction_overwrites_cache() {
    let metamodel = metamodel();
    let region = lru_region();
    let mut writer = cached_session(&metamodel, region.clone());
    load_rows(&mut writer, &customer_shape(), vec![customer_row_versioned(1, "Ann", 5, None)]);

    let config = SessionConfig::new().cache_mode(CacheMode::Put);
    let mut inserting = cached_session_with(&metamodel, region.clone(), config);
    inserting
        .persistence_context_mut()
        .mark_inserted(EntityKey::new(Identifier::from(1), "Customer"));
    load_rows(&mut inserting, &customer_shape(), vec![customer_row_versioned(1, "Anna", 1, None)]);

    let item = region.get(&customer_key(1)).unwrap().unwrap();
    assert_eq!(item.version, Some(Value::Integer(1)));

    let mut reader = cached_session(&metamodel, region);
    let customer = reader.get("Customer", 1).unwrap().unwrap();
    assert_eq!(text(&customer, "name"), "Anna");
}

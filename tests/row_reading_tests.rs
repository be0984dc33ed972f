/// Row reading tests
///
/// Entity materialization from flat rows: identity, subtypes, composite
/// values, listeners and transformers.
/// Run with: cargo test --test row_reading_tests

mod common;

use std::sync::Arc;

use common::*;
use graphload::session::LoadEventKind;
use graphload::metamodel::AttributeMapping;
use graphload::{
    DataType, EntityDefinition, EntityKey, EntityResultSpec, Identifier, LoadError, LockMode, Metamodel,
    ProcessingOptions, ResultShape, Session, SessionConfig, Value, VecRowSource,
};

fn load(shape: &ResultShape, rows: Vec<Vec<Value>>, session: &mut Session) -> graphload::Result<graphload::LoadResult> {
    load_with(shape, rows, session, &ProcessingOptions::default())
}

fn load_with(
    shape: &ResultShape,
    rows: Vec<Vec<Value>>,
    session: &mut Session,
    options: &ProcessingOptions,
) -> graphload::Result<graphload::LoadResult> {
    let mut source = VecRowSource::from_rows(rows);
    graphload::load(shape, &mut source, session, options)
}

#[test]
fn test_two_rows_one_customer_two_orders() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);

    let result = load(
        &customer_shape(),
        vec![
            customer_row(1, "Ann", Some((10, 100))),
            customer_row(1, "Ann", Some((11, 250))),
        ],
        &mut session,
    )
    .unwrap();

    let customers = result.entities();
    assert_eq!(customers.len(), 2);
    assert!(customers[0].ptr_eq(&customers[1]));
    assert_eq!(session.persistence_context().entity_count(), 3);

    let customer = &customers[0];
    assert_eq!(text(customer, "name"), "Ann");
    let orders = attr(customer, "orders");
    let orders = orders.as_collection().unwrap();
    assert!(orders.is_initialized().unwrap());
    assert_eq!(orders.len().unwrap(), 2);

    let totals: Vec<i64> = orders
        .values()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_entity())
        .filter_map(|order| int(order, "total"))
        .collect();
    assert_eq!(totals, vec![100, 250]);
}

#[test]
fn test_order_back_reference_is_the_loaded_customer() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);

    let result = load(&customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))], &mut session).unwrap();
    let customer = result.entities().remove(0);
    let orders = attr(&customer, "orders").as_collection().unwrap().values().unwrap();
    let order = orders[0].as_entity().unwrap().clone();

    let owner = attr(&order, "customer");
    assert!(owner.as_entity().unwrap().ptr_eq(&customer));
    assert_eq!(session.persistence_context().proxy_count(), 0);
}

#[test]
fn test_same_key_same_instance_across_loads() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let shape = customer_shape();

    let first = load(&shape, vec![customer_row(1, "Ann", Some((10, 100)))], &mut session).unwrap();
    let second = load(&shape, vec![customer_row(1, "Ann", Some((12, 999)))], &mut session).unwrap();

    let a = first.entities().remove(0);
    let b = second.entities().remove(0);
    assert!(a.ptr_eq(&b));
    // the collection was already initialized by the first load
    assert_eq!(attr(&b, "orders").as_collection().unwrap().len().unwrap(), 1);
}

#[test]
fn test_null_id_row_is_missing_then_next_row_present() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);

    let result = load(
        &customer_shape(),
        vec![vec![Value::Null; 8], customer_row(2, "Bob", None)],
        &mut session,
    )
    .unwrap();

    assert_eq!(result.row_count(), 2);
    assert!(result.rows()[0].is_null());
    let bob = result.rows()[1].as_entity().unwrap();
    assert_eq!(text(bob, "name"), "Bob");
    assert_eq!(attr(bob, "orders").as_collection().unwrap().len().unwrap(), 0);
}

#[test]
fn test_all_null_composite_is_none() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let mut row = customer_row(1, "Ann", None);
    row[4] = Value::Null;
    row[5] = Value::Null;

    let result = load(&customer_shape(), vec![row, customer_row(2, "Bob", None)], &mut session).unwrap();
    let entities = result.entities();

    assert!(attr(&entities[0], "address").is_null());
    let address = attr(&entities[1], "address");
    let address = address.as_embedded().unwrap();
    assert_eq!(
        address.get("city").and_then(|v| v.as_value()),
        Some(&Value::Text("Springfield".to_string()))
    );
}

#[test]
fn test_required_column_null_is_malformed() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let mut row = customer_row(1, "Ann", None);
    row[1] = Value::Null;

    let err = load(&customer_shape(), vec![row], &mut session).unwrap_err();
    match err {
        LoadError::MalformedColumn { entity, attribute, .. } => {
            assert_eq!(entity, "Customer");
            assert_eq!(attribute, "name");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.persistence_context().entity_count(), 0);
}

#[test]
fn test_discriminator_selects_subtype() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);

    let result = load(
        &vehicle_shape(),
        vec![
            vehicle_row(1, "C", "CAR-1", Some(4), None),
            vehicle_row(2, "T", "TRK-2", None, Some(20)),
            vehicle_row(3, "V", "GEN-3", None, None),
        ],
        &mut session,
    )
    .unwrap();

    let vehicles = result.entities();
    assert_eq!(vehicles[0].entity_name().unwrap(), "Car");
    assert_eq!(int(&vehicles[0], "doors"), Some(4));
    assert_eq!(vehicles[1].entity_name().unwrap(), "Truck");
    assert_eq!(int(&vehicles[1], "payload"), Some(20));
    assert_eq!(vehicles[2].entity_name().unwrap(), "Vehicle");

    // one identity space for the whole hierarchy
    let key = EntityKey::new(Identifier::from(1), "Vehicle");
    assert!(session.persistence_context().contains_entity(&key));
}

#[test]
fn test_unmapped_discriminator_is_wrong_class() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);

    let err = load(&vehicle_shape(), vec![vehicle_row(1, "Q", "???", None, None)], &mut session).unwrap_err();
    match err {
        LoadError::WrongClass { discriminator, entity, id } => {
            assert_eq!(discriminator, "'Q'");
            assert_eq!(entity, "Vehicle");
            assert_eq!(id, "1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_subtype_shape_rejects_sibling_rows() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let cars = ResultShape::new().entity(
        EntityResultSpec::new("v", "Car")
            .id(0)
            .discriminator(1)
            .column("plate", 2)
            .column("doors", 3),
    );

    let err = load(&cars, vec![vehicle_row(2, "T", "TRK-2", None, Some(20))], &mut session).unwrap_err();
    assert!(matches!(err, LoadError::WrongClass { .. }));
}

#[test]
fn test_version_mismatch_under_lock_is_stale() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let shape = customer_shape();
    load(&shape, vec![customer_row_versioned(1, "Ann", 1, None)], &mut session).unwrap();

    // without a lock the newer row is simply ignored
    let unlocked = load(&shape, vec![customer_row_versioned(1, "Ann", 2, None)], &mut session);
    assert!(unlocked.is_ok());

    let locked = ProcessingOptions::new().lock_mode(LockMode::Read);
    let err = load_with(&shape, vec![customer_row_versioned(1, "Ann", 2, None)], &mut session, &locked).unwrap_err();
    assert!(matches!(err, LoadError::StaleState { .. }));

    load_with(&shape, vec![customer_row_versioned(1, "Ann", 1, None)], &mut session, &locked).unwrap();
    let key = EntityKey::new(Identifier::from(1), "Customer");
    assert_eq!(session.persistence_context().entry(&key).unwrap().lock_mode, LockMode::Read);
}

#[test]
fn test_read_only_option_skips_snapshot() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let options = ProcessingOptions::new().read_only(true);

    load_with(&customer_shape(), vec![customer_row(1, "Ann", None)], &mut session, &options).unwrap();
    let key = EntityKey::new(Identifier::from(1), "Customer");
    let entry = session.persistence_context().entry(&key).unwrap();
    assert!(entry.is_read_only());
    assert!(entry.loaded_state.is_none());
    assert_eq!(entry.version, Some(Value::Integer(1)));
}

#[test]
fn test_proxy_is_populated_in_place() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let orders = ResultShape::new().entity(
        EntityResultSpec::new("o", "Order")
            .id(0)
            .column("total", 1)
            .select("customer", &[2]),
    );

    let result = load(
        &orders,
        vec![vec![Value::Integer(10), Value::Integer(5), Value::Integer(1)]],
        &mut session,
    )
    .unwrap();
    let order = result.entities().remove(0);
    let proxy = attr(&order, "customer").as_entity().unwrap().clone();
    assert!(!proxy.is_initialized().unwrap());
    assert_eq!(session.persistence_context().proxy_count(), 1);

    let customers = load(&customer_shape(), vec![customer_row(1, "Ann", None)], &mut session).unwrap();
    let customer = customers.entities().remove(0);
    assert!(customer.ptr_eq(&proxy));
    assert!(proxy.is_initialized().unwrap());
    assert_eq!(text(&proxy, "name"), "Ann");
    assert_eq!(session.persistence_context().proxy_count(), 0);
}

#[test]
fn test_listeners_see_pre_and_post_load() {
    let metamodel = metamodel();
    let listener = Arc::new(RecordingListener::default());
    let mut session = Session::builder(metamodel).listener(listener.clone()).build().unwrap();

    load(&customer_shape(), vec![customer_row(1, "Ann", Some((10, 100)))], &mut session).unwrap();

    let events = listener.events();
    assert_eq!(
        events,
        vec![
            (LoadEventKind::PreLoad, "Customer".to_string(), false),
            (LoadEventKind::PostLoad, "Customer".to_string(), false),
            (LoadEventKind::PreLoad, "Order".to_string(), false),
            (LoadEventKind::PostLoad, "Order".to_string(), false),
        ]
    );
}

#[test]
fn test_tuple_transformer_addresses_by_alias() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let shape = ResultShape::new()
        .entity(customer_spec())
        .scalar("total", 7, DataType::Integer)
        .transformer("tuple");

    let result = load(&shape, vec![customer_row(1, "Ann", Some((10, 100)))], &mut session).unwrap();
    let tuple = result.rows()[0].as_tuple().unwrap();
    assert_eq!(tuple.aliases(), ["c".to_string(), "total".to_string()]);
    assert_eq!(tuple.get("total").and_then(|v| v.as_scalar()), Some(&Value::Integer(100)));
    assert_eq!(text(tuple.get("c").and_then(|v| v.as_entity()).unwrap(), "name"), "Ann");
}

#[test]
fn test_unique_results_drop_repeated_entities() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    let options = ProcessingOptions::new().unique_results(true);

    let result = load_with(
        &customer_shape(),
        vec![
            customer_row(1, "Ann", Some((10, 100))),
            customer_row(1, "Ann", Some((11, 250))),
            customer_row(2, "Bob", None),
        ],
        &mut session,
        &options,
    )
    .unwrap();

    assert_eq!(result.row_count(), 2);
}

#[test]
fn test_natural_id_resolution_recorded() {
    let metamodel = metamodel();
    let mut session = Session::new(metamodel);
    load(&customer_shape(), vec![customer_row(7, "Ann", None)], &mut session).unwrap();

    let id = session
        .resolve_natural_id("Customer", &[Value::Text("ann@example.com".to_string())])
        .unwrap();
    assert_eq!(id, Some(Identifier::from(7)));
}

fn batched_metamodel() -> Arc<Metamodel> {
    Metamodel::builder()
        .entity(
            EntityDefinition::new("Customer")
                .identifier("id", DataType::Integer)
                .attribute(AttributeMapping::basic("name", DataType::Text).not_null())
                .batch_size(4),
        )
        .entity(
            EntityDefinition::new("Order")
                .identifier("id", DataType::Integer)
                .basic("total", DataType::Integer)
                .to_one("customer", "Customer")
                .batch_size(4),
        )
        .build()
        .unwrap()
}

#[test]
fn test_batch_fetch_queue_tracks_unloaded_keys() {
    let metamodel = batched_metamodel();
    let config = SessionConfig::new().batch_fetch_enabled(true);
    let mut session = Session::builder(metamodel).config(config).build().unwrap();

    // id, total, customer id
    let orders = ResultShape::new().entity(
        EntityResultSpec::new("o", "Order")
            .id(0)
            .column("total", 1)
            .select("customer", &[2]),
    );
    load(
        &orders,
        vec![vec![Value::Integer(10), Value::Integer(100), Value::Integer(1)]],
        &mut session,
    )
    .unwrap();

    let customer_key = EntityKey::new(Identifier::from(1), "Customer");
    let order_key = EntityKey::new(Identifier::from(10), "Order");
    let queue = session.persistence_context().batch_fetch_queue();
    assert!(queue.contains_entity_key(&customer_key));
    assert!(!queue.contains_entity_key(&order_key));
    assert_eq!(queue.entity_batch("Customer", 4), vec![Identifier::from(1)]);

    let customers = ResultShape::new().entity(EntityResultSpec::new("c", "Customer").id(0).column("name", 1));
    load(&customers, vec![vec![Value::Integer(1), Value::from("Ann")]], &mut session).unwrap();
    assert!(!session
        .persistence_context()
        .batch_fetch_queue()
        .contains_entity_key(&customer_key));

    // key queued when read, never materialized
    let err = load(&customers, vec![vec![Value::Integer(2), Value::Null]], &mut session).unwrap_err();
    assert!(matches!(err, LoadError::MalformedColumn { .. }));
    assert!(session
        .persistence_context()
        .batch_fetch_queue()
        .contains_entity_key(&EntityKey::new(Identifier::from(2), "Customer")));
}

#[test]
fn test_batch_fetch_queue_unused_when_disabled() {
    let mut session = Session::new(batched_metamodel());
    let orders = ResultShape::new().entity(
        EntityResultSpec::new("o", "Order")
            .id(0)
            .column("total", 1)
            .select("customer", &[2]),
    );
    load(
        &orders,
        vec![vec![Value::Integer(10), Value::Integer(100), Value::Integer(1)]],
        &mut session,
    )
    .unwrap();
    assert!(session
        .persistence_context()
        .batch_fetch_queue()
        .entity_batch("Customer", 4)
        .is_empty());
}

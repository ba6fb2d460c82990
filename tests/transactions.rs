use livelist::datatype::{FieldKind, Value};
use livelist::live::{LiveQuery, ObjectEvent};
use livelist::persist::PersistenceMode;
use livelist::schema::{Field, Schema};
use livelist::screen::{lap_schema, tick_counter_schema, LAP, TICK_COUNTER};
use livelist::store::Store;
use livelist::LivelistError;

fn store() -> std::sync::Arc<Store> {
    let store = Store::open(PersistenceMode::InMemory).unwrap();
    store.open_collection(lap_schema()).unwrap();
    store.open_collection(tick_counter_schema()).unwrap();
    store
}

#[test]
fn defaults_fill_missing_fields() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    assert_eq!(counter.get("ticks"), Some(&Value::Integer(0)));
    let key = counter.get("id").and_then(Value::as_text).unwrap();
    assert_eq!(key.len(), 36, "a hyphenated uuid");
    assert_eq!(store.find(TICK_COUNTER, counter.key().unwrap()).unwrap().unwrap().id(), counter.id());
    let lap = store.write(|tx| tx.create(LAP, &[])).unwrap();
    assert!(lap.get("time").and_then(Value::as_time).is_some());
}

#[test]
fn failing_body_rolls_everything_back() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    let mut laps = store.subscribe(LiveQuery::all(LAP)).unwrap();
    laps.drain();
    let result: livelist::Result<()> = store.write(|tx| {
        tx.create(LAP, &[])?;
        tx.set(TICK_COUNTER, counter.id(), "ticks", Value::Integer(99))?;
        Err(LivelistError::Constraint("changed my mind".into()))
    });
    assert!(matches!(result, Err(LivelistError::Constraint(_))));
    assert_eq!(store.count(LAP).unwrap(), 0);
    let kept = store.get(TICK_COUNTER, counter.id()).unwrap().unwrap();
    assert_eq!(kept.get("ticks"), Some(&Value::Integer(0)));
    assert!(laps.drain().is_empty(), "nothing is published for a rolled back transaction");
}

#[test]
fn rollback_restores_deleted_records_and_their_keys() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    let key = counter.key().unwrap().clone();
    let result = store.write(|tx| {
        tx.delete(TICK_COUNTER, counter.id())?;
        tx.delete(TICK_COUNTER, counter.id())
    });
    assert!(matches!(result, Err(LivelistError::NotFound { .. })));
    assert_eq!(store.find(TICK_COUNTER, &key).unwrap().map(|r| r.id()), Some(counter.id()));
}

#[test]
fn duplicate_primary_key_violates_a_constraint() {
    let store = store();
    let result = store.write(|tx| {
        tx.create(TICK_COUNTER, &[("id", Value::from("one"))])?;
        tx.create(TICK_COUNTER, &[("id", Value::from("one"))])
    });
    assert!(matches!(result, Err(LivelistError::Constraint(_))));
    assert_eq!(store.count(TICK_COUNTER).unwrap(), 0);
}

#[test]
fn primary_key_cannot_change() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    let result = store.write(|tx| tx.set(TICK_COUNTER, counter.id(), "id", Value::from("other")));
    assert!(matches!(result, Err(LivelistError::Constraint(_))));
}

#[test]
fn values_must_match_their_field_kind() {
    let store = store();
    let result = store.write(|tx| tx.create(TICK_COUNTER, &[("ticks", Value::from("many"))]));
    assert!(matches!(result, Err(LivelistError::TypeMismatch { .. })));
    let result = store.write(|tx| tx.create(TICK_COUNTER, &[("tocks", Value::Integer(1))]));
    assert!(matches!(result, Err(LivelistError::UnknownField { .. })));
    let result = store.write(|tx| tx.create("Nope", &[]));
    assert!(matches!(result, Err(LivelistError::UnknownCollection(_))));
}

#[test]
fn required_fields_must_be_given() {
    let store = store();
    store
        .open_collection(Schema::new("Note").field(Field::new("text", FieldKind::Text)))
        .unwrap();
    let result = store.write(|tx| tx.create("Note", &[]));
    assert!(matches!(result, Err(LivelistError::Constraint(_))));
}

#[test]
fn invalid_schemas_are_refused() {
    let store = store();
    let bad_name = Schema::new("not a name").field(Field::new("x", FieldKind::Integer));
    assert!(matches!(store.open_collection(bad_name), Err(LivelistError::Schema(_))));
    let twice = Schema::new("Twice")
        .field(Field::new("x", FieldKind::Integer))
        .field(Field::new("x", FieldKind::Text));
    assert!(matches!(store.open_collection(twice), Err(LivelistError::Schema(_))));
    let other_lap = Schema::new(LAP).field(Field::new("time", FieldKind::Integer));
    assert!(matches!(store.open_collection(other_lap), Err(LivelistError::Schema(_))));
    // reopening with the same schema is fine
    store.open_collection(lap_schema()).unwrap();
}

#[test]
fn observing_a_record_follows_it_until_deletion() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    let mut events = store.observe(TICK_COUNTER, counter.id()).unwrap();
    assert_eq!(events.try_next(), Some(ObjectEvent::Changed(counter.clone())));
    store.write(|tx| tx.set(TICK_COUNTER, counter.id(), "ticks", Value::Integer(1))).unwrap();
    match events.try_next() {
        Some(ObjectEvent::Changed(record)) => assert_eq!(record.get("ticks"), Some(&Value::Integer(1))),
        other => panic!("expected a change, got {other:?}"),
    }
    // another record's change is not reported
    store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap();
    assert!(events.try_next().is_none());
    store.write(|tx| tx.delete(TICK_COUNTER, counter.id())).unwrap();
    assert_eq!(events.try_next(), Some(ObjectEvent::Deleted(counter.id())));
    assert_eq!(store.subscriptions().unwrap(), 0, "registration ends with the record");
}

#[test]
fn writes_from_other_threads_are_serialized() {
    let store = store();
    let counter = store.write(|tx| tx.create(TICK_COUNTER, &[])).unwrap().id();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = std::sync::Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            for _ in 0..25 {
                store
                    .write(|tx| {
                        let ticks = tx
                            .get(TICK_COUNTER, counter)?
                            .and_then(|c| c.get("ticks").and_then(Value::as_integer))
                            .unwrap_or(0);
                        tx.set(TICK_COUNTER, counter, "ticks", Value::Integer(ticks + 1))
                    })
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let kept = store.get(TICK_COUNTER, counter).unwrap().unwrap();
    assert_eq!(kept.get("ticks"), Some(&Value::Integer(100)));
}

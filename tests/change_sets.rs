use std::sync::Arc;

use livelist::datatype::{FieldKind, Value};
use livelist::live::{ChangeSet, LiveQuery, SortOrder, Subscription, CollectionEvent};
use livelist::persist::PersistenceMode;
use livelist::schema::{Field, FieldDefault, Schema};
use livelist::store::Store;
use livelist::LivelistError;

fn item_schema() -> Schema {
    Schema::new("Item")
        .field(Field::new("rank", FieldKind::Integer).indexed())
        .field(Field::new("label", FieldKind::Text).with_default(FieldDefault::Constant(Value::from(""))))
}

// A store holding items with the given ranks, and a subscription to them by rank.
fn setup(ranks: &[i64]) -> (Arc<Store>, Vec<u64>, Subscription<CollectionEvent>) {
    let store = Store::open(PersistenceMode::InMemory).unwrap();
    store.open_collection(item_schema()).unwrap();
    let ids = store
        .write(|tx| {
            let mut ids = Vec::new();
            for rank in ranks {
                ids.push(tx.create("Item", &[("rank", Value::Integer(*rank))])?.id());
            }
            Ok(ids)
        })
        .unwrap();
    let mut subscription = store
        .subscribe(LiveQuery::all("Item").sorted_by("rank", SortOrder::Ascending))
        .unwrap();
    let initial = subscription.try_next().expect("initial event");
    assert!(initial.changes.is_none(), "first event carries no change set");
    assert_eq!(initial.snapshot.len(), ranks.len());
    (store, ids, subscription)
}

fn next_changes(subscription: &mut Subscription<CollectionEvent>) -> ChangeSet {
    let event = subscription.try_next().expect("an event");
    event.changes.expect("a change set")
}

#[test]
fn insertion_is_reported_at_its_new_position() {
    let (store, _, mut subscription) = setup(&[10, 20, 40]);
    store.write(|tx| tx.create("Item", &[("rank", Value::Integer(30))])).unwrap();
    let changes = next_changes(&mut subscription);
    assert_eq!(changes, ChangeSet { inserted: vec![2], updated: vec![], deleted: vec![] });
    assert!(subscription.try_next().is_none(), "one transaction, one event");
}

#[test]
fn deletion_is_reported_at_its_old_position() {
    let (store, ids, mut subscription) = setup(&[10, 20, 30]);
    store.write(|tx| tx.delete("Item", ids[0])).unwrap();
    let changes = next_changes(&mut subscription);
    assert_eq!(changes, ChangeSet { inserted: vec![], updated: vec![], deleted: vec![0] });
}

#[test]
fn modification_in_place_is_an_update() {
    let (store, ids, mut subscription) = setup(&[10, 20, 30]);
    store.write(|tx| tx.set("Item", ids[1], "label", Value::from("middle"))).unwrap();
    let changes = next_changes(&mut subscription);
    assert_eq!(changes, ChangeSet { inserted: vec![], updated: vec![1], deleted: vec![] });
}

#[test]
fn reordering_is_a_deletion_plus_an_insertion() {
    let (store, ids, mut subscription) = setup(&[1, 2, 3]);
    // the first item moves to the end
    store.write(|tx| tx.set("Item", ids[0], "rank", Value::Integer(4))).unwrap();
    let changes = next_changes(&mut subscription);
    assert_eq!(changes, ChangeSet { inserted: vec![2], updated: vec![], deleted: vec![0] });
}

#[test]
fn mixed_transaction_keeps_roles_disjoint() {
    let (store, ids, mut subscription) = setup(&[10, 20, 30, 40]);
    store
        .write(|tx| {
            tx.delete("Item", ids[1])?;
            tx.set("Item", ids[2], "label", Value::from("kept"))?;
            tx.create("Item", &[("rank", Value::Integer(5))])?;
            Ok(())
        })
        .unwrap();
    let changes = next_changes(&mut subscription);
    // old: 10 20 30 40, new: 5 10 30 40
    assert_eq!(changes.deleted, vec![1]);
    assert_eq!(changes.inserted, vec![0]);
    assert_eq!(changes.updated, vec![2]);
    changes.validate(4, 4).expect("valid against both lengths");
}

#[test]
fn untouched_collection_gets_no_event() {
    let (store, _, mut subscription) = setup(&[1]);
    store
        .open_collection(Schema::new("Other").field(Field::new("n", FieldKind::Integer)))
        .unwrap();
    store.write(|tx| tx.create("Other", &[("n", Value::Integer(1))])).unwrap();
    assert!(subscription.try_next().is_none());
}

#[test]
fn create_and_delete_in_one_transaction_is_invisible() {
    let (store, _, mut subscription) = setup(&[1, 2]);
    store
        .write(|tx| {
            let id = tx.create("Item", &[("rank", Value::Integer(3))])?.id();
            tx.delete("Item", id)
        })
        .unwrap();
    assert!(subscription.try_next().is_none());
}

#[test]
fn validation_rejects_out_of_range_positions() {
    let changes = ChangeSet { inserted: vec![], updated: vec![], deleted: vec![3] };
    assert!(matches!(changes.validate(3, 2), Err(LivelistError::MalformedChangeSet(_))));
    let changes = ChangeSet { inserted: vec![4], updated: vec![], deleted: vec![] };
    assert!(matches!(changes.validate(3, 4), Err(LivelistError::MalformedChangeSet(_))));
}

#[test]
fn validation_rejects_inconsistent_lengths() {
    let changes = ChangeSet { inserted: vec![0], updated: vec![], deleted: vec![] };
    assert!(matches!(changes.validate(3, 3), Err(LivelistError::MalformedChangeSet(_))));
}

#[test]
fn validation_rejects_a_row_both_inserted_and_updated() {
    let changes = ChangeSet { inserted: vec![1], updated: vec![1], deleted: vec![] };
    assert!(matches!(changes.validate(2, 3), Err(LivelistError::MalformedChangeSet(_))));
}

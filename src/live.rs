use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Weak};

use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::construct::{Record, RecordHasher, RecordId};
use crate::error::{LivelistError, Result};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub field: String,
    pub order: SortOrder,
}

/// All records of one collection, optionally sorted by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
    collection: String,
    sort: Option<SortDescriptor>,
}
impl LiveQuery {
    pub fn all(collection: &str) -> Self {
        Self {
            collection: collection.to_owned(),
            sort: None,
        }
    }
    pub fn sorted_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some(SortDescriptor {
            field: field.to_owned(),
            order,
        });
        self
    }
    pub fn collection(&self) -> &str {
        &self.collection
    }
    pub fn sort(&self) -> Option<&SortDescriptor> {
        self.sort.as_ref()
    }
}

/// The ordered records a live query evaluated to at one instant.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Arc<Vec<Arc<Record>>>,
}
impl Snapshot {
    pub fn new(records: Vec<Arc<Record>>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Arc<Record>> {
        self.records.get(index)
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Record>> {
        self.records.iter()
    }
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id()).collect()
    }
}

/// Positions that changed between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Positions in the new snapshot.
    pub inserted: Vec<usize>,
    /// Positions in the new snapshot.
    pub updated: Vec<usize>,
    /// Positions in the old snapshot.
    pub deleted: Vec<usize>,
}
impl ChangeSet {
    /// Compare two snapshots by record identity. `modified` holds the
    /// identities whose contents were written since `old` was taken.
    ///
    /// Records that kept their relative order (a longest increasing run of
    /// old positions) stay in place; any other survivor is reported as a
    /// deletion plus an insertion.
    pub fn compute(old: &Snapshot, new: &Snapshot, modified: &RoaringTreemap) -> ChangeSet {
        let mut old_positions: HashMap<RecordId, usize, RecordHasher> = HashMap::default();
        for (i, record) in old.iter().enumerate() {
            old_positions.insert(record.id(), i);
        }
        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        // (old position, new position) of every survivor, in new order
        let mut survivors: Vec<(usize, usize)> = Vec::new();
        let mut surviving = vec![false; old.len()];
        for (j, record) in new.iter().enumerate() {
            match old_positions.get(&record.id()) {
                Some(&i) => {
                    survivors.push((i, j));
                    surviving[i] = true;
                }
                None => inserted.push(j),
            }
        }
        for (i, survived) in surviving.iter().enumerate() {
            if !survived {
                deleted.push(i);
            }
        }
        let olds: Vec<usize> = survivors.iter().map(|(i, _)| *i).collect();
        let stays = longest_increasing(&olds);
        for (k, (i, j)) in survivors.iter().enumerate() {
            if stays[k] {
                if modified.contains(new.records[*j].id()) {
                    updated.push(*j);
                }
            } else {
                deleted.push(*i);
                inserted.push(*j);
            }
        }
        inserted.sort_unstable();
        deleted.sort_unstable();
        ChangeSet {
            inserted,
            updated,
            deleted,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
    /// Check the positions against the lengths of the snapshots they refer to.
    pub fn validate(&self, old_len: usize, new_len: usize) -> Result<()> {
        fn strictly_ascending(positions: &[usize]) -> bool {
            positions.windows(2).all(|w| w[0] < w[1])
        }
        if !strictly_ascending(&self.deleted)
            || !strictly_ascending(&self.inserted)
            || !strictly_ascending(&self.updated)
        {
            return Err(LivelistError::MalformedChangeSet(
                "positions must be unique and ascending".into(),
            ));
        }
        if let Some(&last) = self.deleted.last() {
            if last >= old_len {
                return Err(LivelistError::MalformedChangeSet(format!(
                    "deleted position {} out of range for {} rows",
                    last, old_len
                )));
            }
        }
        for (role, positions) in [("inserted", &self.inserted), ("updated", &self.updated)] {
            if let Some(&last) = positions.last() {
                if last >= new_len {
                    return Err(LivelistError::MalformedChangeSet(format!(
                        "{} position {} out of range for {} rows",
                        role, last, new_len
                    )));
                }
            }
        }
        if self.updated.iter().any(|u| self.inserted.binary_search(u).is_ok()) {
            return Err(LivelistError::MalformedChangeSet(
                "a position is both inserted and updated".into(),
            ));
        }
        if old_len + self.inserted.len() != new_len + self.deleted.len() {
            return Err(LivelistError::MalformedChangeSet(format!(
                "{} rows - {} deleted + {} inserted does not give {} rows",
                old_len,
                self.deleted.len(),
                self.inserted.len(),
                new_len
            )));
        }
        Ok(())
    }
}

// Marks the members of one longest strictly increasing subsequence.
fn longest_increasing(sequence: &[usize]) -> Vec<bool> {
    // tails[l] is the index in `sequence` ending the best run of length l + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; sequence.len()];
    for (k, value) in sequence.iter().enumerate() {
        let l = tails.partition_point(|&t| sequence[t] < *value);
        previous[k] = if l > 0 { Some(tails[l - 1]) } else { None };
        if l == tails.len() {
            tails.push(k);
        } else {
            tails[l] = k;
        }
    }
    let mut member = vec![false; sequence.len()];
    let mut cursor = tails.last().copied();
    while let Some(k) = cursor {
        member[k] = true;
        cursor = previous[k];
    }
    member
}

/// One emission of a collection subscription.
#[derive(Debug, Clone)]
pub struct CollectionEvent {
    pub snapshot: Snapshot,
    /// `None` only on the first event of a subscription.
    pub changes: Option<ChangeSet>,
}

/// One emission of a single-record subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    Changed(Arc<Record>),
    Deleted(RecordId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

// ------------- Registry -------------
pub(crate) struct CollectionRegistration {
    pub id: SubscriptionId,
    pub query: LiveQuery,
    pub last: Snapshot,
    pub sender: Sender<CollectionEvent>,
}

pub(crate) struct ObjectRegistration {
    pub id: SubscriptionId,
    pub collection: String,
    pub record: RecordId,
    pub sender: Sender<ObjectEvent>,
}

/// Everything a committed transaction tells the registry.
#[derive(Debug, Default)]
pub(crate) struct Commit {
    // identities modified in place, per collection
    pub modified: HashMap<String, RoaringTreemap>,
    // identities created or deleted, per collection
    pub membership: HashMap<String, RoaringTreemap>,
}
impl Commit {
    pub fn touches(&self, collection: &str) -> bool {
        self.modified.contains_key(collection) || self.membership.contains_key(collection)
    }
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.membership.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: u64,
    collections: Vec<CollectionRegistration>,
    objects: Vec<ObjectRegistration>,
}
impl ObserverRegistry {
    pub fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
    pub fn add_collection(&mut self, registration: CollectionRegistration) {
        self.collections.push(registration);
    }
    pub fn add_object(&mut self, registration: ObjectRegistration) {
        self.objects.push(registration);
    }
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.collections.len() + self.objects.len();
        self.collections.retain(|r| r.id != id);
        self.objects.retain(|r| r.id != id);
        before != self.collections.len() + self.objects.len()
    }
    pub fn len(&self) -> usize {
        self.collections.len() + self.objects.len()
    }
    /// Re-evaluate the affected queries and queue their events. `evaluate`
    /// gives the current snapshot of a query, `lookup` the current version of
    /// a record. Registrations whose receiver is gone are pruned.
    pub fn publish<E, L>(&mut self, commit: &Commit, evaluate: E, lookup: L)
    where
        E: Fn(&LiveQuery) -> Result<Snapshot>,
        L: Fn(&str, RecordId) -> Option<Arc<Record>>,
    {
        let empty = RoaringTreemap::new();
        self.collections.retain_mut(|registration| {
            let collection = registration.query.collection();
            if !commit.touches(collection) {
                return true;
            }
            let snapshot = match evaluate(&registration.query) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(subscription = registration.id.0, error = %e, "dropping subscription");
                    return false;
                }
            };
            let modified = commit.modified.get(collection).unwrap_or(&empty);
            let changes = ChangeSet::compute(&registration.last, &snapshot, modified);
            if changes.is_empty() {
                registration.last = snapshot;
                return true;
            }
            trace!(
                subscription = registration.id.0,
                inserted = changes.inserted.len(),
                updated = changes.updated.len(),
                deleted = changes.deleted.len(),
                "queueing change set"
            );
            registration.last = snapshot.clone();
            let event = CollectionEvent {
                snapshot,
                changes: Some(changes),
            };
            if registration.sender.send(event).is_err() {
                debug!(subscription = registration.id.0, "pruning abandoned subscription");
                return false;
            }
            true
        });
        self.objects.retain(|registration| {
            let touched = commit
                .modified
                .get(&registration.collection)
                .is_some_and(|m| m.contains(registration.record))
                || commit
                    .membership
                    .get(&registration.collection)
                    .is_some_and(|m| m.contains(registration.record));
            if !touched {
                return true;
            }
            let (event, alive) = match lookup(&registration.collection, registration.record) {
                Some(record) => (ObjectEvent::Changed(record), true),
                None => (ObjectEvent::Deleted(registration.record), false),
            };
            if registration.sender.send(event).is_err() {
                debug!(subscription = registration.id.0, "pruning abandoned subscription");
                return false;
            }
            alive
        });
    }
}

// ------------- Subscription -------------
/// A live subscription to store events. Dropping it disposes it.
pub struct Subscription<E> {
    id: SubscriptionId,
    store: Weak<Store>,
    receiver: Option<Receiver<E>>,
}
impl<E> Subscription<E> {
    pub(crate) fn new(id: SubscriptionId, store: Weak<Store>, receiver: Receiver<E>) -> Self {
        Self {
            id,
            store,
            receiver: Some(receiver),
        }
    }
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
    pub fn is_disposed(&self) -> bool {
        self.receiver.is_none()
    }
    /// The next queued event, if any. Never blocks.
    pub fn try_next(&mut self) -> Option<E> {
        let receiver = self.receiver.as_ref()?;
        match receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
    /// Every queued event, in delivery order.
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
    /// Stop delivery and release the registration. Events still queued are
    /// discarded. Calling this more than once does nothing.
    pub fn dispose(&mut self) {
        if self.receiver.take().is_some() {
            if let Some(store) = self.store.upgrade() {
                store.unsubscribe(self.id);
            }
            debug!(subscription = self.id.0, "disposed");
        }
    }
}
impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}

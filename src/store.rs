use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use roaring::RoaringTreemap;
use tracing::{debug, info, warn};

use crate::construct::{IdGenerator, OtherHasher, Record, RecordId, RecordKeeper};
use crate::datatype::Value;
use crate::error::{LivelistError, Result};
use crate::live::{
    CollectionEvent, CollectionRegistration, Commit, LiveQuery, ObjectEvent,
    ObjectRegistration, ObserverRegistry, Snapshot, Subscription, SubscriptionId,
};
use crate::persist::{PersistenceMode, Persistor, Write};
use crate::schema::Schema;

struct StoreState {
    generator: IdGenerator,
    keepers: HashMap<String, RecordKeeper, OtherHasher>,
    persistor: Persistor,
}
impl StoreState {
    fn keeper(&self, collection: &str) -> Result<&RecordKeeper> {
        self.keepers
            .get(collection)
            .ok_or_else(|| LivelistError::UnknownCollection(collection.to_owned()))
    }
    fn keeper_mut(&mut self, collection: &str) -> Result<&mut RecordKeeper> {
        self.keepers
            .get_mut(collection)
            .ok_or_else(|| LivelistError::UnknownCollection(collection.to_owned()))
    }
    fn evaluate(&self, query: &LiveQuery) -> Result<Snapshot> {
        let keeper = self.keeper(query.collection())?;
        let sort = match query.sort() {
            Some(descriptor) => Some((keeper.schema().require(&descriptor.field)?, descriptor.order)),
            None => None,
        };
        Ok(Snapshot::new(keeper.ordered(sort)))
    }
}

/// Everything behind one mutex, so transactions from any thread are
/// serialized.
pub struct Store {
    state: Mutex<StoreState>,
    observers: Mutex<ObserverRegistry>,
}

impl Store {
    pub fn open(mode: PersistenceMode) -> Result<Arc<Store>> {
        let mut persistor = Persistor::new(&mode)?;
        let mut generator = IdGenerator::new();
        let restored = persistor.restore_identities(&mut generator)?;
        info!(?mode, identities = restored, "store opened");
        Ok(Arc::new(Store {
            state: Mutex::new(StoreState {
                generator,
                keepers: HashMap::default(),
                persistor,
            }),
            observers: Mutex::new(ObserverRegistry::default()),
        }))
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>> {
        Ok(self.state.lock()?)
    }

    /// Register a collection with its schema and restore its persisted
    /// records. Opening an already open collection with the same schema does
    /// nothing.
    pub fn open_collection(&self, schema: Schema) -> Result<()> {
        schema.validate()?;
        let mut state = self.lock_state()?;
        if let Some(keeper) = state.keepers.get(schema.name()) {
            if keeper.schema().as_ref() != &schema {
                return Err(LivelistError::Schema(format!(
                    "collection '{}' is already open with a different schema",
                    schema.name()
                )));
            }
            return Ok(());
        }
        state.persistor.persist_schema(&schema)?;
        let schema = Arc::new(schema);
        let records = state.persistor.restore_records(&schema)?;
        let mut keeper = RecordKeeper::new(Arc::clone(&schema));
        let count = records.len();
        for record in records {
            if state.generator.check(record.id()).is_none() {
                return Err(LivelistError::Invariant(format!(
                    "record {} was restored without its identity",
                    record.id()
                )));
            }
            keeper.keep(record)?;
        }
        state.keepers.insert(schema.name().to_owned(), keeper);
        info!(collection = schema.name(), records = count, "collection opened");
        Ok(())
    }

    /// Run one scoped transaction. Either every mutation made by `body` is
    /// committed, or none is.
    pub fn write<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut state = self.lock_state()?;
        let mut tx = Transaction {
            state: &mut *state,
            undo: Vec::new(),
            writes: Vec::new(),
            commit: Commit::default(),
        };
        let outcome = match body(&mut tx) {
            Ok(value) => tx.persist().map(|_| value),
            Err(e) => Err(e),
        };
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, undo = tx.undo.len(), "transaction rolled back");
                tx.rollback();
                return Err(e);
            }
        };
        let commit = std::mem::take(&mut tx.commit);
        debug!(writes = tx.writes.len(), "transaction committed");
        drop(tx);
        if !commit.is_empty() {
            let state = &*state;
            self.observers.lock()?.publish(
                &commit,
                |query| state.evaluate(query),
                |collection, id| state.keepers.get(collection).and_then(|k| k.get(id)),
            );
        }
        Ok(value)
    }

    /// Evaluate a query right now.
    pub fn objects(&self, query: &LiveQuery) -> Result<Snapshot> {
        self.lock_state()?.evaluate(query)
    }

    pub fn get(&self, collection: &str, id: RecordId) -> Result<Option<Arc<Record>>> {
        Ok(self.lock_state()?.keeper(collection)?.get(id))
    }

    pub fn find(&self, collection: &str, key: &Value) -> Result<Option<Arc<Record>>> {
        Ok(self.lock_state()?.keeper(collection)?.find(key))
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.lock_state()?.keeper(collection)?.len())
    }

    /// Subscribe to a live query. The first event carries the current
    /// snapshot and no change set; every later one carries the change set
    /// from the previous event's snapshot.
    pub fn subscribe(self: &Arc<Self>, query: LiveQuery) -> Result<Subscription<CollectionEvent>> {
        // the state lock is held so no commit slips in between the initial
        // snapshot and the registration
        let state = self.lock_state()?;
        let snapshot = state.evaluate(&query)?;
        let (sender, receiver) = mpsc::channel();
        let mut observers = self.observers.lock()?;
        let id = observers.allocate_id();
        sender
            .send(CollectionEvent {
                snapshot: snapshot.clone(),
                changes: None,
            })
            .map_err(|e| LivelistError::Invariant(e.to_string()))?;
        debug!(subscription = ?id, collection = query.collection(), rows = snapshot.len(), "subscribed");
        observers.add_collection(CollectionRegistration {
            id,
            query,
            last: snapshot,
            sender,
        });
        Ok(Subscription::new(id, Arc::downgrade(self), receiver))
    }

    /// Observe a single record. The first event carries its current version;
    /// later ones follow every committed change, ending with `Deleted`.
    pub fn observe(self: &Arc<Self>, collection: &str, id: RecordId) -> Result<Subscription<ObjectEvent>> {
        let state = self.lock_state()?;
        let record = state.keeper(collection)?.get(id).ok_or_else(|| LivelistError::NotFound {
            collection: collection.to_owned(),
            id,
        })?;
        let (sender, receiver) = mpsc::channel();
        let mut observers = self.observers.lock()?;
        let subscription = observers.allocate_id();
        sender
            .send(ObjectEvent::Changed(record))
            .map_err(|e| LivelistError::Invariant(e.to_string()))?;
        debug!(subscription = ?subscription, collection, record = id, "observing");
        observers.add_object(ObjectRegistration {
            id: subscription,
            collection: collection.to_owned(),
            record: id,
            sender,
        });
        Ok(Subscription::new(subscription, Arc::downgrade(self), receiver))
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        match self.observers.lock() {
            Ok(mut observers) => {
                observers.remove(id);
            }
            Err(e) => warn!(error = %e, "could not release subscription"),
        }
    }

    /// Number of live registrations, for diagnostics.
    pub fn subscriptions(&self) -> Result<usize> {
        Ok(self.observers.lock()?.len())
    }
}

enum Undo {
    Created { collection: String, id: RecordId },
    Replaced { collection: String, previous: Arc<Record> },
    Deleted { collection: String, previous: Arc<Record> },
}

/// A scoped write. Only reachable inside [`Store::write`].
pub struct Transaction<'s> {
    state: &'s mut StoreState,
    undo: Vec<Undo>,
    writes: Vec<Write>,
    commit: Commit,
}

impl Transaction<'_> {
    /// Create a record from the given fields; fields left out take their
    /// schema default.
    pub fn create(&mut self, collection: &str, fields: &[(&str, Value)]) -> Result<Arc<Record>> {
        let schema = Arc::clone(self.state.keeper(collection)?.schema());
        let mut values: Vec<Option<Value>> = vec![None; schema.fields().len()];
        for (name, value) in fields {
            let position = schema.require(name)?;
            schema.check(position, value)?;
            values[position] = Some(value.clone());
        }
        let mut complete = Vec::with_capacity(values.len());
        for (field, value) in schema.fields().iter().zip(values) {
            match value.or_else(|| field.default_value()) {
                Some(value) => complete.push(value),
                None => {
                    return Err(LivelistError::Constraint(format!(
                        "field '{}' of '{}' is required",
                        field.name(),
                        collection
                    )))
                }
            }
        }
        let id = self.state.generator.generate();
        let kept = self
            .state
            .keeper_mut(collection)?
            .keep(Record::new(id, schema, complete))?;
        self.undo.push(Undo::Created {
            collection: collection.to_owned(),
            id,
        });
        self.writes.push(Write::Upsert(Arc::clone(&kept)));
        self.commit
            .membership
            .entry(collection.to_owned())
            .or_insert_with(RoaringTreemap::new)
            .insert(id);
        Ok(kept)
    }

    /// Set one field of an existing record.
    pub fn set(&mut self, collection: &str, id: RecordId, field: &str, value: Value) -> Result<Arc<Record>> {
        let keeper = self.state.keeper_mut(collection)?;
        let position = keeper.schema().require(field)?;
        keeper.schema().check(position, &value)?;
        let current = keeper.get(id).ok_or_else(|| LivelistError::NotFound {
            collection: collection.to_owned(),
            id,
        })?;
        let (kept, previous) = keeper.replace(current.with_value(position, value))?;
        self.undo.push(Undo::Replaced {
            collection: collection.to_owned(),
            previous,
        });
        self.writes.push(Write::Upsert(Arc::clone(&kept)));
        self.commit
            .modified
            .entry(collection.to_owned())
            .or_insert_with(RoaringTreemap::new)
            .insert(id);
        Ok(kept)
    }

    pub fn delete(&mut self, collection: &str, id: RecordId) -> Result<()> {
        let previous = self
            .state
            .keeper_mut(collection)?
            .remove(id)
            .ok_or_else(|| LivelistError::NotFound {
                collection: collection.to_owned(),
                id,
            })?;
        self.undo.push(Undo::Deleted {
            collection: collection.to_owned(),
            previous,
        });
        self.writes.push(Write::Delete {
            collection: collection.to_owned(),
            id,
        });
        self.commit
            .membership
            .entry(collection.to_owned())
            .or_insert_with(RoaringTreemap::new)
            .insert(id);
        Ok(())
    }

    /// The current version of a record, including changes made so far in
    /// this transaction.
    pub fn get(&self, collection: &str, id: RecordId) -> Result<Option<Arc<Record>>> {
        Ok(self.state.keeper(collection)?.get(id))
    }

    pub fn find(&self, collection: &str, key: &Value) -> Result<Option<Arc<Record>>> {
        Ok(self.state.keeper(collection)?.find(key))
    }

    fn persist(&mut self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.state.persistor.commit(&self.writes)
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Created { collection, id } => {
                    if let Some(keeper) = self.state.keepers.get_mut(&collection) {
                        keeper.remove(id);
                    }
                }
                Undo::Replaced { collection, previous } | Undo::Deleted { collection, previous } => {
                    if let Some(keeper) = self.state.keepers.get_mut(&collection) {
                        keeper.reinstate(previous);
                    }
                }
            }
        }
        self.writes.clear();
        self.commit = Commit::default();
    }
}

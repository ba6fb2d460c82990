use std::sync::Arc;

// used to keep the one-to-one mapping between records and their primary keys
use bimap::BiMap;

// records are kept in identity order, indexes in value order
use core::hash::BuildHasherDefault;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use seahash::SeaHasher;

// used to print out readable forms of a record
use std::fmt;

// our own stuff that we need
use crate::datatype::Value;
use crate::error::{LivelistError, Result};
use crate::live::SortOrder;
use crate::schema::Schema;

// ------------- RecordId -------------
pub type RecordId = u64;

pub type RecordHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: RecordId = 0;

#[derive(Debug)]
pub struct IdGenerator {
    lower_bound: RecordId,
    retained: HashSet<RecordId, RecordHasher>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::<RecordId, RecordHasher>::default(),
        }
    }
    // Identities are only ever created by the generator, but they have to
    // be retained when a store is reopened so that newly generated ones
    // never collide with them. Identities are not released on deletion: a
    // deleted record and a later one must never share an identity, or change
    // sets would report a replacement as an update. The persistor keeps
    // committed identities apart from the records for that reason.
    pub fn retain(&mut self, id: RecordId) {
        self.retained.insert(id);
        if id > self.lower_bound {
            self.lower_bound = id;
        }
    }
    pub fn check(&self, id: RecordId) -> Option<RecordId> {
        self.retained.get(&id).cloned()
    }
    pub fn generate(&mut self) -> RecordId {
        self.lower_bound += 1;
        self.retained.insert(self.lower_bound);
        self.lower_bound
    }
}

// ------------- Record -------------
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    schema: Arc<Schema>,
    values: Vec<Value>, // in the storage order of the schema
}
impl Record {
    pub fn new(id: RecordId, schema: Arc<Schema>, values: Vec<Value>) -> Self {
        Self { id, schema, values }
    }
    // Records are immutable once kept. A mutation produces a new record
    // under the same identity, which is why old snapshots stay intact.
    pub fn id(&self) -> RecordId {
        self.id
    }
    pub fn collection(&self) -> &str {
        self.schema.name()
    }
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.schema.position(field_name).map(|p| &self.values[p])
    }
    pub fn value_at(&self, position: usize) -> &Value {
        &self.values[position]
    }
    pub fn key(&self) -> Option<&Value> {
        self.schema.primary_key_position().map(|p| &self.values[p])
    }
    pub fn with_value(&self, position: usize, value: Value) -> Record {
        let mut values = self.values.clone();
        values[position] = value;
        Record::new(self.id, Arc::clone(&self.schema), values)
    }
}
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.schema.name() == other.schema.name()
            && self.values == other.values
    }
}
impl Eq for Record {}
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for (field, value) in self.schema.fields().iter().zip(self.values.iter()) {
            s += &(field.name().to_owned() + ": " + &value.to_string() + ", ");
        }
        s.truncate(s.len().saturating_sub(2));
        write!(f, "{} {} {{{}}}", self.schema.name(), self.id, s)
    }
}

// ------------- RecordKeeper -------------
// One keeper per collection. It owns the current version of every record
// and the lookups needed to find records by key or walk them in value order.
#[derive(Debug)]
pub struct RecordKeeper {
    schema: Arc<Schema>,
    kept: BTreeMap<RecordId, Arc<Record>>,
    keys: BiMap<RecordId, Value>,
    indexes: HashMap<usize, BTreeSet<(Value, RecordId)>, OtherHasher>,
}
impl RecordKeeper {
    pub fn new(schema: Arc<Schema>) -> Self {
        let mut indexes = HashMap::<usize, BTreeSet<(Value, RecordId)>, OtherHasher>::default();
        for (position, field) in schema.fields().iter().enumerate() {
            if field.is_indexed() {
                indexes.insert(position, BTreeSet::new());
            }
        }
        Self {
            schema,
            kept: BTreeMap::new(),
            keys: BiMap::new(),
            indexes,
        }
    }
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
    /// Keep a record under a new identity, enforcing primary key uniqueness.
    pub fn keep(&mut self, record: Record) -> Result<Arc<Record>> {
        if self.kept.contains_key(&record.id()) {
            return Err(LivelistError::Invariant(format!(
                "record {} is already kept in '{}'",
                record.id(),
                self.schema.name()
            )));
        }
        if let Some(key) = record.key() {
            if self.keys.contains_right(key) {
                return Err(LivelistError::Constraint(format!(
                    "duplicate primary key {} in '{}'",
                    key,
                    self.schema.name()
                )));
            }
        }
        let keepsake = Arc::new(record);
        self.link(&keepsake);
        Ok(keepsake)
    }
    /// Replace the current version of a record, returning the previous one.
    pub fn replace(&mut self, record: Record) -> Result<(Arc<Record>, Arc<Record>)> {
        let previous = match self.kept.get(&record.id()) {
            Some(previous) => Arc::clone(previous),
            None => {
                return Err(LivelistError::NotFound {
                    collection: self.schema.name().to_owned(),
                    id: record.id(),
                })
            }
        };
        if previous.key() != record.key() {
            return Err(LivelistError::Constraint(format!(
                "primary key of record {} in '{}' cannot change",
                record.id(),
                self.schema.name()
            )));
        }
        self.unlink(&previous);
        let keepsake = Arc::new(record);
        self.link(&keepsake);
        Ok((keepsake, previous))
    }
    pub fn remove(&mut self, id: RecordId) -> Option<Arc<Record>> {
        let removed = self.kept.get(&id).map(Arc::clone)?;
        self.unlink(&removed);
        Some(removed)
    }
    /// Put back an exact earlier version of a record, whatever is kept now.
    /// Used when a transaction is rolled back.
    pub fn reinstate(&mut self, record: Arc<Record>) {
        if let Some(current) = self.kept.get(&record.id()).map(Arc::clone) {
            self.unlink(&current);
        }
        self.link(&record);
    }
    pub fn get(&self, id: RecordId) -> Option<Arc<Record>> {
        self.kept.get(&id).map(Arc::clone)
    }
    pub fn find(&self, key: &Value) -> Option<Arc<Record>> {
        self.keys.get_by_right(key).and_then(|id| self.get(*id))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    /// All kept records, either in identity (creation) order or sorted by the
    /// field at `position`. Ties are broken by identity in the same direction.
    pub fn ordered(&self, sort: Option<(usize, SortOrder)>) -> Vec<Arc<Record>> {
        match sort {
            None => self.kept.values().map(Arc::clone).collect(),
            Some((position, order)) => {
                if let Some(index) = self.indexes.get(&position) {
                    let by_value = index.iter().filter_map(|(_, id)| self.kept.get(id));
                    match order {
                        SortOrder::Ascending => by_value.map(Arc::clone).collect(),
                        SortOrder::Descending => {
                            let mut records: Vec<Arc<Record>> = by_value.map(Arc::clone).collect();
                            records.reverse();
                            records
                        }
                    }
                } else {
                    let mut records: Vec<Arc<Record>> = self.kept.values().map(Arc::clone).collect();
                    records.sort_by(|a, b| {
                        (a.value_at(position), a.id()).cmp(&(b.value_at(position), b.id()))
                    });
                    if order == SortOrder::Descending {
                        records.reverse();
                    }
                    records
                }
            }
        }
    }
    fn link(&mut self, record: &Arc<Record>) {
        if let Some(key) = record.key() {
            self.keys.insert(record.id(), key.clone());
        }
        for (position, index) in self.indexes.iter_mut() {
            index.insert((record.value_at(*position).clone(), record.id()));
        }
        self.kept.insert(record.id(), Arc::clone(record));
    }
    fn unlink(&mut self, record: &Arc<Record>) {
        self.keys.remove_by_left(&record.id());
        for (position, index) in self.indexes.iter_mut() {
            index.remove(&(record.value_at(*position).clone(), record.id()));
        }
        self.kept.remove(&record.id());
    }
}

// used for persistence
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::construct::{IdGenerator, Record, RecordId};
use crate::datatype::Value;
use crate::error::{LivelistError, Result};
use crate::schema::Schema;

/// Where the store keeps its durable copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// An in-memory SQLite database, gone when the store is dropped.
    InMemory,
    /// A SQLite database file at the given path.
    File(String),
}

/// A single durable change, produced by a committed transaction.
#[derive(Debug, Clone)]
pub enum Write {
    Upsert(Arc<Record>),
    Delete { collection: String, id: RecordId },
}

// ------------- Persistence -------------
pub struct Persistor {
    db: Connection,
}
impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Persistor> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists Identity (
                Record_Identity integer not null,
                constraint unique_and_referenceable_Record_Identity primary key (
                    Record_Identity
                )
            );-- STRICT;
            create table if not exists Collection (
                Collection text not null,
                Schema text not null,
                constraint referenceable_Collection primary key (
                    Collection
                )
            );-- STRICT;
            create table if not exists Record (
                Record_Identity integer not null,
                Collection text not null,
                Fields text not null,
                constraint Record_in_Collection foreign key (
                    Collection
                ) references Collection(Collection),
                constraint Record_is_Identity foreign key (
                    Record_Identity
                ) references Identity(Record_Identity),
                constraint referenceable_Record_Identity primary key (
                    Record_Identity
                )
            );-- STRICT;
            ",
        )?;
        Ok(Persistor { db: connection })
    }
    /// Persist a schema the first time its collection is opened. Returns true
    /// if an identical schema was already persisted. A different schema under
    /// the same name is an error.
    pub fn persist_schema(&mut self, schema: &Schema) -> Result<bool> {
        let existing: Option<String> = self
            .db
            .prepare_cached(
                "
                select Schema
                    from Collection
                    where Collection = ?
            ",
            )?
            .query_row(params![schema.name()], |r| r.get(0))
            .optional()?;
        match existing {
            Some(text) => {
                let persisted: Schema = serde_json::from_str(&text)?;
                if &persisted != schema {
                    return Err(LivelistError::Schema(format!(
                        "collection '{}' was persisted with a different schema",
                        schema.name()
                    )));
                }
                Ok(true)
            }
            None => {
                self.db
                    .prepare_cached(
                        "
                    insert into Collection (
                        Collection,
                        Schema
                    ) values (?, ?)
                ",
                    )?
                    .execute(params![schema.name(), serde_json::to_string(schema)?])?;
                Ok(false)
            }
        }
    }
    /// Retain every identity ever committed, including those of records
    /// deleted since, so that a reopened store never hands them out again.
    pub fn restore_identities(&mut self, generator: &mut IdGenerator) -> Result<usize> {
        let mut statement = self.db.prepare_cached(
            "
            select Record_Identity
                from Identity
        ",
        )?;
        let identities = statement.query_map([], |row| row.get::<_, RecordId>(0))?;
        let mut count = 0;
        for id in identities {
            generator.retain(id?);
            count += 1;
        }
        Ok(count)
    }
    pub fn restore_records(&mut self, schema: &Arc<Schema>) -> Result<Vec<Record>> {
        let mut statement = self.db.prepare_cached(
            "
            select Record_Identity,
                    Fields
                from Record
                where Collection = ?
                order by Record_Identity
        ",
        )?;
        let rows = statement.query_map(params![schema.name()], |row| {
            Ok((row.get::<_, RecordId>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (id, text) = row?;
            let mut fields: BTreeMap<String, Value> = serde_json::from_str(&text)?;
            let mut values = Vec::with_capacity(schema.fields().len());
            for field in schema.fields() {
                let value = match fields.remove(field.name()) {
                    Some(value) => value,
                    None => field.default_value().ok_or_else(|| LivelistError::DataCorruption {
                        message: format!(
                            "record {} in '{}' lacks required field '{}'",
                            id,
                            schema.name(),
                            field.name()
                        ),
                    })?,
                };
                if value.kind() != field.kind() {
                    return Err(LivelistError::DataCorruption {
                        message: format!(
                            "record {} in '{}' holds a {} in {} field '{}'",
                            id,
                            schema.name(),
                            value.kind(),
                            field.kind(),
                            field.name()
                        ),
                    });
                }
                values.push(value);
            }
            records.push(Record::new(id, Arc::clone(schema), values));
        }
        Ok(records)
    }
    /// Apply the writes of one transaction atomically.
    pub fn commit(&mut self, writes: &[Write]) -> Result<()> {
        let tx = self.db.transaction()?;
        {
            let mut identity = tx.prepare_cached(
                "
                insert or ignore into Identity (
                    Record_Identity
                ) values (?)
            ",
            )?;
            let mut upsert = tx.prepare_cached(
                "
                insert into Record (
                    Record_Identity,
                    Collection,
                    Fields
                ) values (?, ?, ?)
                on conflict (Record_Identity) do update set Fields = excluded.Fields
            ",
            )?;
            let mut delete = tx.prepare_cached(
                "
                delete from Record
                    where Record_Identity = ?
                    and Collection = ?
            ",
            )?;
            for write in writes {
                match write {
                    Write::Upsert(record) => {
                        identity.execute(params![record.id()])?;
                        let fields: BTreeMap<&str, &Value> = record
                            .schema()
                            .fields()
                            .iter()
                            .map(|f| f.name())
                            .zip(record.values().iter())
                            .collect();
                        upsert.execute(params![
                            record.id(),
                            record.collection(),
                            serde_json::to_string(&fields)?
                        ])?;
                    }
                    Write::Delete { collection, id } => {
                        delete.execute(params![id, collection])?;
                    }
                }
            }
        }
        tx.commit()?;
        debug!(writes = writes.len(), "persisted");
        Ok(())
    }
}

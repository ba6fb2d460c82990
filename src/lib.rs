//! Livelist – live queries over a small embedded record store, and the glue
//! that keeps list-shaped views in step with them.
//!
//! The crate centers on the *change set*: the difference between two
//! consecutive snapshots of an ordered query, expressed as positions.
//! * A [`construct::Record`] has a stable identity (a `u64`) and scalar field
//!   values laid out by its collection's [`schema::Schema`].
//! * A [`live::LiveQuery`] selects every record of one collection, optionally
//!   sorted by one field.
//! * A [`live::Snapshot`] is what a query evaluated to at one instant.
//! * A [`live::ChangeSet`] lists `deleted` positions of the old snapshot and
//!   `inserted` and `updated` positions of the new one.
//!
//! ## Modules
//! * [`store`] – The store handle, scoped transactions and subscriptions.
//! * [`construct`] – Record identities, records and their per-collection keepers.
//! * [`schema`] / [`datatype`] – Explicit schemas and the scalar values they allow.
//! * [`live`] – Live queries, snapshots, change set computation, subscriptions.
//! * [`persist`] – SQLite persistence and restoration.
//! * [`view`] – The list surface abstraction and an in-memory table model.
//! * [`sync`] – The synchronizer applying change sets to a list surface.
//! * [`binding`] – Write-through bindings from UI actions to transactions.
//! * [`screen`] – The lap screen, wiring all of the above together.
//! * [`config`] – Settings read with the `config` crate.
//!
//! ## Transactions
//! Every mutation happens inside [`store::Store::write`]. A transaction
//! commits in memory and in SQLite, or not at all. Transactions are
//! serialized by the store. Once one commits, each affected subscription gets
//! its change set queued before `write` returns.
//!
//! ## Synchronizing a list
//! A [`sync::Synchronizer`] reloads its surface from the first event and
//! applies every later change set as one bracketed batch: deletions, then
//! insertions, then updates.
//!
//! ## Quick Start
//! ```
//! use livelist::datatype::FieldKind;
//! use livelist::live::{LiveQuery, SortOrder};
//! use livelist::persist::PersistenceMode;
//! use livelist::schema::{Field, FieldDefault, Schema};
//! use livelist::store::Store;
//! use livelist::sync::Synchronizer;
//! use livelist::view::TableModel;
//!
//! let store = Store::open(PersistenceMode::InMemory).unwrap();
//! store
//!     .open_collection(
//!         Schema::new("Lap").field(Field::new("time", FieldKind::Time).with_default(FieldDefault::Now)),
//!     )
//!     .unwrap();
//! let query = LiveQuery::all("Lap").sorted_by("time", SortOrder::Descending);
//! let mut list = Synchronizer::new(&store, query, TableModel::new(), |lap| lap.id()).unwrap();
//! list.pump().unwrap();
//! store.write(|tx| { tx.create("Lap", &[])?; tx.create("Lap", &[]) }).unwrap();
//! list.pump().unwrap();
//! assert_eq!(list.surface().rows().len(), 2);
//! ```

pub mod binding;
pub mod config;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod live;
pub mod persist;
pub mod schema;
pub mod screen;
pub mod store;
pub mod sync;
pub mod view;

pub use error::{LivelistError, Result};

use std::sync::Arc;

use tracing::{debug, trace};

use crate::construct::Record;
use crate::error::{LivelistError, Result};
use crate::live::{ChangeSet, CollectionEvent, LiveQuery, Snapshot, Subscription};
use crate::store::Store;
use crate::view::{EditBatch, ListSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    AwaitingSnapshot,
    Synchronized,
}

pub type Render<R> = Box<dyn Fn(&Record) -> R + Send>;

pub struct Synchronizer<S: ListSurface> {
    subscription: Subscription<CollectionEvent>,
    surface: S,
    render: Render<S::Row>,
    state: SyncState,
    snapshot: Snapshot,
}

impl<S: ListSurface> Synchronizer<S> {
    pub fn new<F>(store: &Arc<Store>, query: LiveQuery, surface: S, render: F) -> Result<Self>
    where
        F: Fn(&Record) -> S::Row + Send + 'static,
    {
        let subscription = store.subscribe(query)?;
        Ok(Self {
            subscription,
            surface,
            render: Box::new(render),
            state: SyncState::AwaitingSnapshot,
            snapshot: Snapshot::default(),
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }
    pub fn surface(&self) -> &S {
        &self.surface
    }
    /// The snapshot the surface currently shows.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
    pub fn is_disposed(&self) -> bool {
        self.subscription.is_disposed()
    }

    /// Apply every queued event in order. Returns how many were applied.
    /// Does nothing once disposed.
    pub fn pump(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(event) = self.subscription.try_next() {
            self.apply(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Apply one event to the surface.
    pub fn apply(&mut self, event: CollectionEvent) -> Result<()> {
        let CollectionEvent { snapshot, changes } = event;
        match (self.state, changes) {
            (SyncState::AwaitingSnapshot, None) => {
                let rows = snapshot.iter().map(|r| (self.render)(&**r)).collect();
                self.surface.reload_data(rows);
                self.state = SyncState::Synchronized;
                debug!(rows = snapshot.len(), "initial reload");
            }
            (SyncState::AwaitingSnapshot, Some(_)) => {
                return Err(LivelistError::Invariant(
                    "change set received before the initial snapshot".into(),
                ));
            }
            (SyncState::Synchronized, None) => {
                return Err(LivelistError::Invariant(
                    "a second snapshot without a change set".into(),
                ));
            }
            (SyncState::Synchronized, Some(changes)) => {
                changes.validate(self.surface.row_count(), snapshot.len())?;
                let batch = Self::project(&snapshot, &changes, &self.render);
                trace!(
                    deletions = batch.deletions.len(),
                    insertions = batch.insertions.len(),
                    updates = batch.updates.len(),
                    "applying edit batch"
                );
                batch.apply_to(&mut self.surface)?;
            }
        }
        if self.surface.row_count() != snapshot.len() {
            return Err(LivelistError::Invariant(format!(
                "surface shows {} rows but the snapshot has {}",
                self.surface.row_count(),
                snapshot.len()
            )));
        }
        self.snapshot = snapshot;
        Ok(())
    }

    /// Turn a change set into the edits that bring a surface showing the
    /// previous snapshot to `snapshot`: deletions first, then insertions,
    /// then in-place updates.
    pub fn project<F>(snapshot: &Snapshot, changes: &ChangeSet, render: F) -> EditBatch<S::Row>
    where
        F: Fn(&Record) -> S::Row,
    {
        let rendered = |indices: &[usize]| -> Vec<(usize, S::Row)> {
            indices
                .iter()
                .filter_map(|i| snapshot.get(*i).map(|r| (*i, render(&**r))))
                .collect()
        };
        EditBatch {
            deletions: changes.deleted.clone(),
            insertions: rendered(&changes.inserted),
            updates: rendered(&changes.updated),
        }
    }

    /// Stop receiving events. Calling this more than once does nothing.
    pub fn dispose(&mut self) {
        self.subscription.dispose();
    }
}

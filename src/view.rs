use tracing::trace;

use crate::error::{LivelistError, Result};

/// Inside one `begin_updates`/`end_updates` bracket, deletions name positions
/// before the batch, insertions and reloads name positions after it.
pub trait ListSurface {
    type Row;
    fn row_count(&self) -> usize;
    fn row(&self, index: usize) -> Option<&Self::Row>;
    /// Replace every row at once.
    fn reload_data(&mut self, rows: Vec<Self::Row>);
    fn begin_updates(&mut self) -> Result<()>;
    fn delete_rows(&mut self, indices: &[usize]) -> Result<()>;
    fn insert_rows(&mut self, rows: Vec<(usize, Self::Row)>) -> Result<()>;
    fn reload_rows(&mut self, rows: Vec<(usize, Self::Row)>) -> Result<()>;
    fn end_updates(&mut self) -> Result<()>;
}

/// The edits of one bracket, in the order they are handed to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBatch<R> {
    /// Positions before the batch.
    pub deletions: Vec<usize>,
    /// Positions after the batch.
    pub insertions: Vec<(usize, R)>,
    /// Positions after the batch.
    pub updates: Vec<(usize, R)>,
}
impl<R> EditBatch<R> {
    /// Hand the batch to a surface inside one bracket.
    pub fn apply_to<S: ListSurface<Row = R>>(self, surface: &mut S) -> Result<()> {
        surface.begin_updates()?;
        surface.delete_rows(&self.deletions)?;
        surface.insert_rows(self.insertions)?;
        surface.reload_rows(self.updates)?;
        surface.end_updates()
    }
}

struct PendingBatch<R> {
    deletions: Vec<usize>,
    insertions: Vec<(usize, R)>,
    reloads: Vec<(usize, R)>,
}

/// An in-memory table: the rows a screen would display.
pub struct TableModel<R> {
    rows: Vec<R>,
    pending: Option<PendingBatch<R>>,
    full_reloads: usize,
    batches: usize,
}
impl<R> TableModel<R> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            pending: None,
            full_reloads: 0,
            batches: 0,
        }
    }
    pub fn rows(&self) -> &[R] {
        &self.rows
    }
    /// How many times every row was replaced at once.
    pub fn full_reloads(&self) -> usize {
        self.full_reloads
    }
    /// How many update brackets were closed successfully.
    pub fn batches(&self) -> usize {
        self.batches
    }
    fn pending(&mut self) -> Result<&mut PendingBatch<R>> {
        self.pending
            .as_mut()
            .ok_or_else(|| LivelistError::Invariant("row edit outside of an update bracket".into()))
    }
}
impl<R> Default for TableModel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ListSurface for TableModel<R> {
    type Row = R;
    fn row_count(&self) -> usize {
        self.rows.len()
    }
    fn row(&self, index: usize) -> Option<&R> {
        self.rows.get(index)
    }
    fn reload_data(&mut self, rows: Vec<R>) {
        self.rows = rows;
        self.full_reloads += 1;
    }
    fn begin_updates(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(LivelistError::Invariant("update brackets cannot nest".into()));
        }
        self.pending = Some(PendingBatch {
            deletions: Vec::new(),
            insertions: Vec::new(),
            reloads: Vec::new(),
        });
        Ok(())
    }
    fn delete_rows(&mut self, indices: &[usize]) -> Result<()> {
        self.pending()?.deletions.extend_from_slice(indices);
        Ok(())
    }
    fn insert_rows(&mut self, rows: Vec<(usize, R)>) -> Result<()> {
        self.pending()?.insertions.extend(rows);
        Ok(())
    }
    fn reload_rows(&mut self, rows: Vec<(usize, R)>) -> Result<()> {
        self.pending()?.reloads.extend(rows);
        Ok(())
    }
    fn end_updates(&mut self) -> Result<()> {
        let PendingBatch {
            mut deletions,
            mut insertions,
            reloads,
        } = self
            .pending
            .take()
            .ok_or_else(|| LivelistError::Invariant("no update bracket to close".into()))?;
        let before = self.rows.len();
        deletions.sort_unstable();
        if deletions.windows(2).any(|w| w[0] == w[1]) {
            return Err(LivelistError::MalformedChangeSet("a row is deleted twice".into()));
        }
        if let Some(&last) = deletions.last() {
            if last >= before {
                return Err(LivelistError::MalformedChangeSet(format!(
                    "cannot delete row {} of {}",
                    last, before
                )));
            }
        }
        insertions.sort_by_key(|(i, _)| *i);
        if insertions.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(LivelistError::MalformedChangeSet("a row is inserted twice".into()));
        }
        let after = before - deletions.len() + insertions.len();
        if let Some((last, _)) = insertions.last() {
            if *last >= after {
                return Err(LivelistError::MalformedChangeSet(format!(
                    "cannot insert row {} into {}",
                    last, after
                )));
            }
        }
        for (index, _) in reloads.iter() {
            if *index >= after {
                return Err(LivelistError::MalformedChangeSet(format!(
                    "cannot reload row {} of {}",
                    index, after
                )));
            }
            if insertions.binary_search_by_key(index, |(i, _)| *i).is_ok() {
                return Err(LivelistError::MalformedChangeSet(format!(
                    "row {} is both inserted and reloaded",
                    index
                )));
            }
        }
        // Everything is in range, so the batch can no longer fail halfway.
        for index in deletions.iter().rev() {
            self.rows.remove(*index);
        }
        for (index, row) in insertions {
            self.rows.insert(index, row);
        }
        for (index, row) in reloads {
            self.rows[index] = row;
        }
        self.batches += 1;
        trace!(before, after, "update bracket closed");
        Ok(())
    }
}

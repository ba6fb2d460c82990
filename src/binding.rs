use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{Store, Transaction};

/// The emitting end of an action stream.
#[derive(Debug)]
pub struct ActionTrigger<E> {
    sender: Sender<E>,
}
impl<E> Clone for ActionTrigger<E> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}
impl<E> ActionTrigger<E> {
    /// Emit one action. Returns false once nothing listens anymore.
    pub fn fire(&self, event: E) -> bool {
        self.sender.send(event).is_ok()
    }
}
impl ActionTrigger<()> {
    pub fn tap(&self) -> bool {
        self.fire(())
    }
}

/// The receiving end of an action stream.
#[derive(Debug)]
pub struct ActionSource<E> {
    receiver: Receiver<E>,
}

/// A connected trigger and source.
pub fn action<E>() -> (ActionTrigger<E>, ActionSource<E>) {
    let (sender, receiver) = mpsc::channel();
    (ActionTrigger { sender }, ActionSource { receiver })
}

pub type TransactionBody<E> = Box<dyn FnMut(&mut Transaction<'_>, E) -> Result<()> + Send>;

pub struct WriteThrough<E> {
    name: String,
    store: Arc<Store>,
    source: ActionSource<E>,
    body: TransactionBody<E>,
}
impl<E> WriteThrough<E> {
    pub fn new<F>(name: &str, store: &Arc<Store>, source: ActionSource<E>, body: F) -> Self
    where
        F: FnMut(&mut Transaction<'_>, E) -> Result<()> + Send + 'static,
    {
        Self {
            name: name.to_owned(),
            store: Arc::clone(store),
            source,
            body: Box::new(body),
        }
    }
    /// Run one transaction for every pending action, in order. The first
    /// failing transaction stops the pump and is returned.
    pub fn pump(&mut self) -> Result<usize> {
        let mut ran = 0;
        while let Ok(event) = self.source.receiver.try_recv() {
            let body = &mut self.body;
            if let Err(e) = self.store.write(|tx| body(tx, event)) {
                warn!(binding = %self.name, error = %e, "write-through failed");
                return Err(e);
            }
            ran += 1;
        }
        if ran > 0 {
            debug!(binding = %self.name, transactions = ran, "write-through");
        }
        Ok(ran)
    }
}

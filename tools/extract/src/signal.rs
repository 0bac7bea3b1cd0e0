//! One-shot completion signals.
//!
//! A job's result is moved into its [`Publish`] end exactly once; the
//! collector obtains it by consuming the matching [`Observe`] end. The
//! channel hand-off orders every write the worker made before `fire` ahead
//! of every read the collector makes after `wait`.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Create a connected publisher/observer pair.
pub fn oneshot<T>() -> (Publish<T>, Observe<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Publish(tx), Observe(rx))
}

/// Worker side of a completion signal.
#[derive(Debug)]
pub struct Publish<T>(SyncSender<T>);

impl<T> Publish<T> {
    /// Publish the result. Never blocks: the channel has room for one value.
    pub fn fire(self, value: T) {
        // The observer may already be gone (its architecture failed).
        let _ = self.0.send(value);
    }
}

/// Collector side of a completion signal.
#[derive(Debug)]
pub struct Observe<T>(Receiver<T>);

impl<T> Observe<T> {
    /// Block until the result is published.
    pub fn wait(self) -> Result<T, Abandoned> {
        self.0.recv().map_err(|_| Abandoned)
    }
}

/// The publisher was dropped without firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("job finished without publishing a result")
    }
}

impl std::error::Error for Abandoned {}

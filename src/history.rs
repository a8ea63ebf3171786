//! Everything received from the device during a session,
//! in order of arrival.
//!
//! Callers who want to know about new records register a [`Waiter`]
//! *before* looking at what is already there.
//! That way an append happening in between is never missed.

use std::fmt::Display;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::{
    sync::{watch, RwLock},
    time::Instant,
};
use tracing::{debug, trace};

use crate::error::Error;

/// One unit of data received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position in the session, starting at 1.
    pub index: u64,

    /// When the record was appended.
    pub timestamp: DateTime<Utc>,

    /// The raw bytes.
    pub payload: Bytes,
}

impl Record {
    /// Decode the payload as UTF-8, replacing bad bytes.
    ///
    /// If a terminator is given, the text is cut at its first occurrence
    /// (the terminator itself is excluded).
    pub fn decode(&self, terminator: Option<&str>) -> String {
        let text = String::from_utf8_lossy(&self.payload);

        match terminator.filter(|t| !t.is_empty()) {
            Some(terminator) => match text.find(terminator) {
                Some(end) => text[..end].to_owned(),
                None => text.into_owned(),
            },
            None => text.into_owned(),
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = String::from_utf8_lossy(&self.payload);
        let s = text.chars().take(48).collect::<String>();

        write!(f, "#{}: {}", self.index, s.trim())
    }
}

/// What waiters are told on each change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pulse {
    newest: u64,
    open: bool,
}

/// The append-only log of received records.
#[derive(Debug)]
pub struct History {
    records: RwLock<Vec<Record>>,
    pulse: watch::Sender<Pulse>,
}

impl Default for History {
    fn default() -> Self {
        let (pulse, _) = watch::channel(Pulse {
            newest: 0,
            open: false,
        });

        Self {
            records: RwLock::default(),
            pulse,
        }
    }
}

impl History {
    /// A new, empty and closed history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record and wake everyone waiting.
    /// Returns the index the record got.
    pub async fn append(&self, payload: Bytes) -> u64 {
        let mut records = self.records.write().await;

        let index = records.len() as u64 + 1;
        let record = Record {
            index,
            timestamp: Utc::now(),
            payload,
        };
        trace!(%record, "Appending");
        records.push(record);

        // Still holding the lock, so woken waiters will find the record.
        self.pulse.send_modify(|pulse| pulse.newest = index);

        index
    }

    /// The number of records.
    pub async fn len(&self) -> u64 {
        self.records.read().await.len() as u64
    }

    /// Are there no records?
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// The most recent record.
    pub async fn latest(&self) -> Option<Record> {
        self.records.read().await.last().cloned()
    }

    /// The record this many positions before the newest.
    /// Zero means the newest.
    pub async fn at(&self, back_offset: usize) -> Option<Record> {
        let records = self.records.read().await;

        let position = records.len().checked_sub(back_offset.checked_add(1)?)?;
        records.get(position).cloned()
    }

    /// The record with this index.
    pub async fn get(&self, index: u64) -> Option<Record> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;

        self.records.read().await.get(position).cloned()
    }

    /// All records with an index greater than the given one, oldest first.
    pub async fn since(&self, index: u64) -> Vec<Record> {
        let records = self.records.read().await;

        let from = usize::try_from(index).unwrap_or(usize::MAX).min(records.len());
        records[from..].to_vec()
    }

    /// The first record with an index greater than the given one.
    pub async fn first_since(&self, index: u64) -> Option<Record> {
        let from = usize::try_from(index).ok()?;

        self.records.read().await.get(from).cloned()
    }

    /// Subscribe to appends.
    ///
    /// Appends after this call are seen by the waiter,
    /// even if they happen before it starts waiting.
    pub fn register_waiter(&self) -> Waiter {
        Waiter {
            pulse: self.pulse.subscribe(),
        }
    }

    /// Is a session ongoing?
    pub fn is_open(&self) -> bool {
        self.pulse.borrow().open
    }

    /// Start a new session.
    /// Clears all records, the next one will get index 1.
    pub(crate) async fn reset(&self) {
        let mut records = self.records.write().await;
        records.clear();

        self.pulse.send_replace(Pulse {
            newest: 0,
            open: true,
        });
        debug!("History reset");
    }

    /// End the session.
    /// Records are kept, but all waiters are woken and told the session is gone.
    pub(crate) fn close(&self) {
        self.pulse.send_modify(|pulse| pulse.open = false);
        debug!("History closed");
    }
}

/// A subscription to appends on a [`History`].
#[derive(Debug)]
pub struct Waiter {
    pulse: watch::Receiver<Pulse>,
}

impl Waiter {
    /// Wait for the next append, or until the deadline.
    ///
    /// Returns `Ok(false)` on timeout.
    /// Fails with [`Error::NotConnected`] if the session is (or becomes) closed.
    pub async fn await_append(&mut self, deadline: Instant) -> Result<bool, Error> {
        if !self.pulse.borrow().open {
            return Err(Error::NotConnected);
        }

        match tokio::time::timeout_at(deadline, self.pulse.changed()).await {
            Ok(Ok(())) => {
                if self.pulse.borrow_and_update().open {
                    Ok(true)
                } else {
                    Err(Error::NotConnected)
                }
            }
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_elapsed) => Ok(false),
        }
    }

    /// The newest index as of the last wake.
    pub fn newest(&self) -> u64 {
        self.pulse.borrow().newest
    }
}

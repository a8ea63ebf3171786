//! Only one user may operate the device at a time.
//!
//! The gate is a single slot.
//! A user registers to take it, and anyone may recall to free it again.

use std::{future::Future, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{error::Error, user::User};

/// The single-slot arbitration of the device.
///
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    occupant: Arc<Mutex<Option<User>>>,
}

impl Gate {
    /// A free gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot.
    ///
    /// Fails if anyone, including the same user, already holds it.
    pub async fn register(&self, user: &User) -> Result<(), Error> {
        let mut occupant = self.occupant.lock().await;

        if let Some(current) = occupant.as_ref() {
            debug!(%user, %current, "Rejected, gate is occupied");
            return Err(Error::AlreadyRegistered);
        }

        *occupant = Some(user.clone());
        info!(%user, "Registered");

        Ok(())
    }

    /// Free the slot.
    ///
    /// Any user may do this, not only the one holding the slot.
    /// Returns who held it.
    pub async fn recall(&self, user: &User) -> Result<User, Error> {
        let previous = self
            .occupant
            .lock()
            .await
            .take()
            .ok_or(Error::NotRegistered)?;

        if &previous == user {
            info!(%user, "Recalled");
        } else {
            info!(%user, %previous, "Recalled on behalf of another user");
        }

        Ok(previous)
    }

    /// Who holds the slot, if anyone.
    pub async fn occupant(&self) -> Option<User> {
        self.occupant.lock().await.clone()
    }

    /// Run the operation only if the slot is taken.
    pub async fn guard<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.occupant().await.is_none() {
            debug!("Rejected, nobody is registered");
            return Err(Error::NotRegistered);
        }

        Ok(operation().await)
    }
}

use std::fmt::Display;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Someone using the gateway, identified by where they connect from.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The name of the user.
    pub name: Arc<String>,
}

impl User {
    /// A user with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::new(name.into()),
        }
    }
}

impl From<IpAddr> for User {
    fn from(ip: IpAddr) -> Self {
        Self::new(&ip.to_string())
    }
}

impl Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

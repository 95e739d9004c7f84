//! Caller identity and roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role carried in a verified credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Tenant. Sees and manages only its own documents.
    #[serde(rename = "CLIENTE")]
    Cliente,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "OPERADOR")]
    Operador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cliente => "CLIENTE",
            Role::Admin => "ADMIN",
            Role::Operador => "OPERADOR",
        }
    }

    /// Whether the role has cross-tenant visibility.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Operador)
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLIENTE" => Ok(Role::Cliente),
            "ADMIN" => Ok(Role::Admin),
            "OPERADOR" => Ok(Role::Operador),
            other => Err(crate::Error::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positive numeric identifier of a client (document owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ClientId(i64);

impl ClientId {
    pub fn new(id: i64) -> crate::Result<Self> {
        if id <= 0 {
            return Err(crate::Error::InvalidClientId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for ClientId {
    type Error = crate::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for i64 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A verified caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: ClientId,
    pub role: Role,
}

impl Identity {
    pub fn new(subject_id: ClientId, role: Role) -> Self {
        Self { subject_id, role }
    }
}

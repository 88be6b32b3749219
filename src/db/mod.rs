// ABOUTME: Transport capability used by the explorer core
// ABOUTME: Connection descriptors, driver-agnostic traits, and the SQL Server implementation

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::models::{AuthMode, RowSet};

pub mod identifier;
pub mod sqlserver;

pub use sqlserver::SqlServerConnector;

/// Failures reported by a transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The statement failed but the connection is still usable
    #[error("{0}")]
    Server(String),
    /// The connection itself is gone
    #[error("{0}")]
    Link(String),
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Link(_))
    }
}

/// Opens transports from descriptors
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlTransport>, TransportError>;
}

/// An open connection able to run statements
#[async_trait]
pub trait SqlTransport: Send {
    /// Run a statement and return its first result set. `params` bind to
    /// `@P1..@Pn` and are only ever values, never identifiers.
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<RowSet, TransportError>;

    /// Switch the connection's current database
    async fn scope(&mut self, database: &str) -> Result<(), TransportError>;

    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Where the server lives: `host`, `host\INSTANCE` or `host,port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub instance: Option<String>,
    pub port: Option<u16>,
}

impl ServerAddress {
    pub fn parse(server: &str) -> Result<Self, String> {
        let trimmed = server.trim();
        let trimmed = trimmed
            .strip_prefix("tcp:")
            .or_else(|| trimmed.strip_prefix("TCP:"))
            .unwrap_or(trimmed);

        let (rest, port) = match trimmed.split_once(',') {
            Some((rest, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port in server address '{}'", server))?;
                (rest.trim(), Some(port))
            }
            None => (trimmed, None),
        };

        let (host, instance) = match rest.split_once('\\') {
            Some((host, instance)) if !instance.trim().is_empty() => {
                (host.trim(), Some(instance.trim().to_string()))
            }
            Some(_) => return Err(format!("empty instance name in server address '{}'", server)),
            None => (rest, None),
        };

        if host.is_empty() {
            return Err(format!("missing host in server address '{}'", server));
        }

        let host = match host {
            "." | "(local)" | "(localdb)" => "localhost".to_string(),
            other => other.to_string(),
        };

        Ok(Self {
            host,
            instance,
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{}", instance)?;
        }
        if let Some(port) = self.port {
            write!(f, ",{}", port)?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Trusted,
    SqlLogin { username: String, password: String },
}

impl Credentials {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credentials::Trusted => AuthMode::Trusted,
            Credentials::SqlLogin { .. } => AuthMode::Credentialed,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Trusted => f.write_str("Trusted"),
            Credentials::SqlLogin { username, .. } => f
                .debug_struct("SqlLogin")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything a connector needs to attempt one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub driver: String,
    pub server: ServerAddress,
    /// Empty means the login's default database
    pub database: String,
    pub credentials: Credentials,
    pub trust_certificate: bool,
}

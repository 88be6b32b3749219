// ABOUTME: Connection lifecycle for SQL Explorer
// ABOUTME: Validates profiles, opens sessions with bounded timeouts, and owns the live transport

use std::time::Duration;

use crate::config::{ConnectionProfile, Preferences};
use crate::db::{
    ConnectionDescriptor, Connector, Credentials, ServerAddress, SqlServerConnector, SqlTransport,
    TransportError,
};
use crate::error::{ExplorerError, Result};
use crate::models::SessionInfo;

/// Connect and per-statement limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub query: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            query: Duration::from_secs(30),
        }
    }
}

impl From<&Preferences> for Timeouts {
    fn from(prefs: &Preferences) -> Self {
        Self {
            connect: Duration::from_secs(prefs.connect_timeout_secs.max(1)),
            query: Duration::from_secs(prefs.query_timeout_secs.max(1)),
        }
    }
}

impl ConnectionDescriptor {
    /// Validate a profile into a descriptor without touching the network
    pub fn from_profile(profile: &ConnectionProfile) -> Result<Self> {
        let driver = profile.driver.trim();
        if driver.is_empty() {
            return Err(ExplorerError::Configuration("driver is required".to_string()));
        }
        if profile.server.trim().is_empty() {
            return Err(ExplorerError::Configuration("server is required".to_string()));
        }
        let server = ServerAddress::parse(&profile.server).map_err(ExplorerError::Configuration)?;

        let credentials = if profile.trusted_connection {
            Credentials::Trusted
        } else {
            let username = profile
                .username
                .as_deref()
                .filter(|u| !u.trim().is_empty());
            let password = profile.password.as_deref().filter(|p| !p.is_empty());
            match (username, password) {
                (Some(username), Some(password)) => Credentials::SqlLogin {
                    username: username.trim().to_string(),
                    password: password.to_string(),
                },
                (None, _) => {
                    return Err(ExplorerError::Configuration(
                        "username is required when trusted connection is off".to_string(),
                    ))
                }
                (_, None) => {
                    return Err(ExplorerError::Configuration(
                        "password is required when trusted connection is off".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            driver: driver.to_string(),
            server,
            database: profile.database.trim().to_string(),
            credentials,
            trust_certificate: profile.trust_certificate,
        })
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            driver: self.driver.clone(),
            server: self.server.to_string(),
            database: self.database.clone(),
            auth_mode: self.credentials.mode(),
        }
    }
}

/// Opens sessions through a connector
pub struct ConnectionManager<C: Connector = SqlServerConnector> {
    connector: C,
    timeouts: Timeouts,
}

impl ConnectionManager<SqlServerConnector> {
    pub fn sql_server(timeouts: Timeouts) -> Self {
        Self::new(SqlServerConnector, timeouts)
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, timeouts: Timeouts) -> Self {
        Self {
            connector,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Make exactly one connection attempt for `profile`
    pub async fn connect(&self, profile: &ConnectionProfile) -> Result<Session> {
        let descriptor = ConnectionDescriptor::from_profile(profile)?;
        let info = descriptor.info();
        log::debug!(
            "Opening session to {} ({:?}, database '{}')",
            info.server,
            info.auth_mode,
            info.database
        );

        let after = self.timeouts.connect;
        match tokio::time::timeout(after, self.connector.open(&descriptor)).await {
            Err(_) => Err(ExplorerError::Timeout {
                operation: "connect",
                after,
            }),
            Ok(Err(e)) => Err(ExplorerError::Connection(e.to_string())),
            Ok(Ok(transport)) => Ok(Session::new(transport, info, self.timeouts.query)),
        }
    }
}

/// Why a statement on a session did not produce rows
#[derive(Debug)]
pub(crate) enum CallError {
    Closed,
    Timeout(Duration),
    Transport(TransportError),
}

impl CallError {
    /// Map into the caller's error kind; closed and timed-out sessions keep their own kinds
    pub(crate) fn into_explorer(
        self,
        operation: &'static str,
        kind: fn(String) -> ExplorerError,
    ) -> ExplorerError {
        match self {
            CallError::Closed => ExplorerError::Connection("session is closed".to_string()),
            CallError::Timeout(after) => ExplorerError::Timeout { operation, after },
            CallError::Transport(e) => kind(e.to_string()),
        }
    }
}

/// An open connection owned by one user context
pub struct Session {
    transport: Option<Box<dyn SqlTransport>>,
    info: SessionInfo,
    query_timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Session {
    pub fn new(transport: Box<dyn SqlTransport>, info: SessionInfo, query_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            info,
            query_timeout,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(transport) => {
                log::debug!("Closing session to {}", self.info.server);
                transport
                    .close()
                    .await
                    .map_err(|e| ExplorerError::Connection(e.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Test the connection by querying the server version
    pub async fn server_version(&mut self) -> Result<String> {
        let rows = self
            .query("SELECT @@VERSION", &[])
            .await
            .map_err(|e| e.into_explorer("version check", ExplorerError::Connection))?;
        rows.first_column()
            .into_iter()
            .next()
            .ok_or_else(|| ExplorerError::Connection("No version returned".to_string()))
    }

    pub(crate) async fn query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> std::result::Result<crate::models::RowSet, CallError> {
        let after = self.query_timeout;
        let transport = self.transport.as_mut().ok_or(CallError::Closed)?;
        let outcome = tokio::time::timeout(after, transport.query(sql, params)).await;
        self.settle(outcome)
    }

    pub(crate) async fn scope(&mut self, database: &str) -> std::result::Result<(), CallError> {
        let after = self.query_timeout;
        let transport = self.transport.as_mut().ok_or(CallError::Closed)?;
        let outcome = tokio::time::timeout(after, transport.scope(database)).await;
        self.settle(outcome)
    }

    /// Drop the transport when the connection can no longer be trusted
    fn settle<T>(
        &mut self,
        outcome: std::result::Result<std::result::Result<T, TransportError>, tokio::time::error::Elapsed>,
    ) -> std::result::Result<T, CallError> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_fatal() {
                    log::debug!("Invalidating session to {}: {}", self.info.server, e);
                    self.transport = None;
                }
                Err(CallError::Transport(e))
            }
            Err(_) => {
                // A half-read TDS stream cannot be reused
                log::debug!("Invalidating session to {} after timeout", self.info.server);
                self.transport = None;
                Err(CallError::Timeout(self.query_timeout))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.is_some() {
            log::trace!("Session to {} released on drop", self.info.server);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMode, RowSet};
    use crate::testing::{names, CountingConnector, ScriptedTransport};
    use std::sync::atomic::Ordering;

    fn credentialed(username: Option<&str>, password: Option<&str>) -> ConnectionProfile {
        ConnectionProfile {
            trusted_connection: false,
            username: username.map(String::from),
            password: password.map(String::from),
            ..ConnectionProfile::default()
        }
    }

    #[test]
    fn test_zero_timeouts_are_raised_to_one_second() {
        let prefs = Preferences {
            connect_timeout_secs: 0,
            query_timeout_secs: 0,
            ..Preferences::default()
        };
        let timeouts = Timeouts::from(&prefs);
        assert_eq!(timeouts.connect, Duration::from_secs(1));
        assert_eq!(timeouts.query, Duration::from_secs(1));
        assert_eq!(Timeouts::from(&Preferences::default()), Timeouts::default());
    }

    #[test]
    fn test_descriptor_from_default_profile() {
        let descriptor = ConnectionDescriptor::from_profile(&ConnectionProfile::default()).unwrap();
        assert_eq!(descriptor.credentials, Credentials::Trusted);
        assert_eq!(descriptor.database, "master");
        assert_eq!(descriptor.info().auth_mode, AuthMode::Trusted);
    }

    #[test]
    fn test_descriptor_requires_server_and_driver() {
        let profile = ConnectionProfile {
            server: "  ".to_string(),
            ..ConnectionProfile::default()
        };
        assert!(matches!(
            ConnectionDescriptor::from_profile(&profile),
            Err(ExplorerError::Configuration(_))
        ));

        let profile = ConnectionProfile {
            driver: String::new(),
            ..ConnectionProfile::default()
        };
        assert!(matches!(
            ConnectionDescriptor::from_profile(&profile),
            Err(ExplorerError::Configuration(_))
        ));
    }

    #[test]
    fn test_descriptor_rejects_bad_port() {
        let profile = ConnectionProfile {
            server: "localhost,abc".to_string(),
            ..ConnectionProfile::default()
        };
        assert!(matches!(
            ConnectionDescriptor::from_profile(&profile),
            Err(ExplorerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_password_fails_without_connecting() {
        let connector = CountingConnector::default();
        let manager = ConnectionManager::new(connector.clone(), Timeouts::default());

        for profile in [
            credentialed(Some("sa"), None),
            credentialed(Some("sa"), Some("")),
            credentialed(None, Some("secret")),
            credentialed(Some("   "), Some("secret")),
        ] {
            let result = manager.connect(&profile).await;
            assert!(matches!(result, Err(ExplorerError::Configuration(_))));
        }
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_connect_success_opens_session() {
        let connector = CountingConnector::default();
        let manager = ConnectionManager::new(connector.clone(), Timeouts::default());

        let session = manager
            .connect(&credentialed(Some("sa"), Some("secret")))
            .await
            .unwrap();
        assert!(session.is_open());
        assert_eq!(session.info().auth_mode, AuthMode::Credentialed);
        assert_eq!(connector.attempts(), 1);

        // Each call is an independent attempt
        let _second = manager.connect(&ConnectionProfile::default()).await.unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_transport_message() {
        let connector = CountingConnector {
            fail_with: Some(TransportError::Server("Login failed for user 'sa'.".to_string())),
            ..CountingConnector::default()
        };
        let manager = ConnectionManager::new(connector.clone(), Timeouts::default());

        match manager.connect(&credentialed(Some("sa"), Some("wrong"))).await {
            Err(ExplorerError::Connection(message)) => {
                assert!(message.contains("Login failed for user 'sa'."))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_timeout_is_distinct() {
        let connector = CountingConnector {
            delay: Some(Duration::from_secs(5)),
            ..CountingConnector::default()
        };
        let timeouts = Timeouts {
            connect: Duration::from_millis(20),
            query: Duration::from_secs(1),
        };
        let manager = ConnectionManager::new(connector, timeouts);

        let err = manager.connect(&ConnectionProfile::default()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = ScriptedTransport::new(|_, _| Ok(RowSet::default()));
        let closed = transport.close_counter();
        let mut session = transport.into_session();

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_open());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let err = session.server_version().await.unwrap_err();
        assert_eq!(err, ExplorerError::Connection("session is closed".to_string()));
    }

    #[tokio::test]
    async fn test_server_version() {
        let mut session = ScriptedTransport::new(|sql, _| {
            assert_eq!(sql, "SELECT @@VERSION");
            Ok(names("", &["Microsoft SQL Server 2019 (RTM)"]))
        })
        .into_session();

        let version = session.server_version().await.unwrap();
        assert!(version.starts_with("Microsoft SQL Server"));
    }

    #[tokio::test]
    async fn test_link_failure_invalidates_session() {
        let mut session =
            ScriptedTransport::new(|_, _| Err(TransportError::Link("connection reset".into())))
                .into_session();

        assert!(session.server_version().await.is_err());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_server_error_keeps_session_open() {
        let mut session =
            ScriptedTransport::new(|_, _| Err(TransportError::Server("permission denied".into())))
                .into_session();

        assert!(session.server_version().await.is_err());
        assert!(session.is_open());
    }
}

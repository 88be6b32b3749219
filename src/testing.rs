// ABOUTME: Scripted transports for unit tests
// ABOUTME: Record every statement and answer from a closure instead of a live server

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::{ConnectionDescriptor, Connector, SqlTransport, TransportError};
use crate::models::{AuthMode, RowSet, SessionInfo, Value};
use crate::session::Session;

type Responder = Box<dyn FnMut(&str, &[&str]) -> Result<RowSet, TransportError> + Send>;
type ScopeResponder = Box<dyn FnMut(&str) -> Result<(), TransportError> + Send>;

/// Statements seen by a scripted transport, shared with the test
#[derive(Clone, Default)]
pub struct StatementLog(Arc<Mutex<Vec<String>>>);

impl StatementLog {
    fn push(&self, statement: String) {
        self.0.lock().unwrap().push(statement);
    }

    pub fn statements(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct ScriptedTransport {
    log: StatementLog,
    responder: Responder,
    scope_responder: ScopeResponder,
    delay: Option<Duration>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl FnMut(&str, &[&str]) -> Result<RowSet, TransportError> + Send + 'static,
    ) -> Self {
        Self {
            log: StatementLog::default(),
            responder: Box::new(responder),
            scope_responder: Box::new(|_| Ok(())),
            delay: None,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_scope(
        mut self,
        scope_responder: impl FnMut(&str) -> Result<(), TransportError> + Send + 'static,
    ) -> Self {
        self.scope_responder = Box::new(scope_responder);
        self
    }

    /// Sleep before answering each query
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> StatementLog {
        self.log.clone()
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closed.clone()
    }

    pub fn into_session(self) -> Session {
        session_from(Box::new(self))
    }
}

#[async_trait]
impl SqlTransport for ScriptedTransport {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<RowSet, TransportError> {
        self.log.push(sql.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(sql, params)
    }

    async fn scope(&mut self, database: &str) -> Result<(), TransportError> {
        self.log.push(format!("USE {}", database));
        (self.scope_responder)(database)
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn session_from(transport: Box<dyn SqlTransport>) -> Session {
    Session::new(
        transport,
        SessionInfo {
            driver: "ODBC Driver 17 for SQL Server".to_string(),
            server: "localhost".to_string(),
            database: "master".to_string(),
            auth_mode: AuthMode::Trusted,
        },
        Duration::from_millis(200),
    )
}

/// Connector that counts attempts and hands out scripted transports
#[derive(Clone, Default)]
pub struct CountingConnector {
    pub attempts: Arc<AtomicUsize>,
    pub fail_with: Option<TransportError>,
    pub delay: Option<Duration>,
}

impl CountingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn open(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlTransport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(Box::new(ScriptedTransport::new(|_, _| Ok(RowSet::default())))),
        }
    }
}

/// Single-column row set of text values
pub fn names(column: &str, values: &[&str]) -> RowSet {
    RowSet::new(
        vec![column.to_string()],
        values
            .iter()
            .map(|v| vec![Value::Text(v.to_string())])
            .collect(),
    )
}

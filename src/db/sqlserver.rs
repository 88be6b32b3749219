// ABOUTME: SQL Server transport using tiberius
// ABOUTME: Opens TDS connections and converts result rows into explorer values

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, SqlBrowser, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::identifier::quote;
use super::{ConnectionDescriptor, Connector, Credentials, SqlTransport, TransportError};
use crate::models::{RowSet, Value};

impl From<tiberius::error::Error> for TransportError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error;
        match err {
            Error::Io { .. } | Error::Protocol(_) | Error::Tls(_) | Error::Routing { .. } => {
                TransportError::Link(err.to_string())
            }
            other => TransportError::Server(other.to_string()),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Link(err.to_string())
    }
}

/// Driver names the TDS connector answers to
pub fn supports_driver(driver: &str) -> bool {
    let driver = driver.trim().to_lowercase();
    driver.contains("sql server")
        || driver.contains("sqlserver")
        || matches!(driver.as_str(), "mssql" | "tds" | "tiberius")
}

/// Opens tiberius connections over tokio TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerConnector;

impl SqlServerConnector {
    fn build_config(descriptor: &ConnectionDescriptor) -> Result<Config, TransportError> {
        let mut config = Config::new();
        config.host(&descriptor.server.host);
        if let Some(port) = descriptor.server.port {
            config.port(port);
        }
        if let Some(instance) = &descriptor.server.instance {
            config.instance_name(instance);
        }
        if !descriptor.database.is_empty() {
            config.database(&descriptor.database);
        }
        if descriptor.trust_certificate {
            config.trust_cert();
        }

        match &descriptor.credentials {
            Credentials::SqlLogin { username, password } => {
                config.authentication(AuthMethod::sql_server(username, password));
            }
            Credentials::Trusted => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(TransportError::Server(
                        "Trusted connections are only supported on Windows".to_string(),
                    ));
                }
            }
        }

        Ok(config)
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlTransport>, TransportError> {
        if !supports_driver(&descriptor.driver) {
            return Err(TransportError::UnsupportedDriver(descriptor.driver.clone()));
        }

        let config = Self::build_config(descriptor)?;
        log::debug!("Connecting to SQL Server at {}", descriptor.server);

        // Resolves named instances through SQL Browser, plain host:port otherwise
        let tcp = TcpStream::connect_named(&config).await?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(config, tcp.compat_write()).await?;

        log::debug!("Connected to {}", descriptor.server);
        Ok(Box::new(SqlServerConnection { client }))
    }
}

pub struct SqlServerConnection {
    client: Client<Compat<TcpStream>>,
}

#[async_trait]
impl SqlTransport for SqlServerConnection {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<RowSet, TransportError> {
        log::trace!("Executing: {}", sql);

        // Parameterless statements go out as plain batches; sp_executesql is
        // only needed when there is something to bind.
        let mut stream = if params.is_empty() {
            self.client.simple_query(sql).await?
        } else {
            let binds: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
            self.client.query(sql, &binds).await?
        };

        let columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut rows = Vec::new();
        for row in stream.into_first_result().await? {
            rows.push(row.into_iter().map(column_data_to_value).collect::<Result<Vec<_>, _>>()?);
        }

        Ok(RowSet::new(columns, rows))
    }

    async fn scope(&mut self, database: &str) -> Result<(), TransportError> {
        let statement = format!("USE {}", quote(database));
        self.client.simple_query(statement).await?.into_results().await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.client.close().await?;
        Ok(())
    }
}

/// Convert one tiberius cell into an explorer value
pub(crate) fn column_data_to_value(data: ColumnData<'static>) -> Result<Value, TransportError> {
    let value = match data {
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::U8(v) => v.map(|v| Value::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| Value::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| Value::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(Value::Int),
        ColumnData::F32(v) => v.map(|v| Value::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(Value::Float),
        ColumnData::String(v) => v.map(|v| Value::Text(v.into_owned())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.map(|v| Value::Bytes(v.into_owned())),
        ColumnData::Numeric(v) => v.map(|v| Value::Decimal(v.to_string())),
        ColumnData::Xml(v) => v.map(|v| Value::Text(v.into_owned().into_string())),
        ref data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => NaiveDateTime::from_sql(data)?.map(Value::DateTime),
        ref data @ ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(Value::Date),
        ref data @ ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(Value::Time),
        ref data @ ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data)?.map(Value::DateTimeOffset)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

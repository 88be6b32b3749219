// ABOUTME: Catalog introspection for SQL Explorer
// ABOUTME: Lists databases on the instance and base tables inside one database

use crate::db::identifier;
use crate::error::{ExplorerError, Result};
use crate::session::Session;

const DATABASES_QUERY: &str = "SELECT name FROM sys.databases";

const BASE_TABLES_QUERY: &str =
    "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'";

/// Database names in the order the server returns them
pub async fn list_databases(session: &mut Session) -> Result<Vec<String>> {
    let rows = session
        .query(DATABASES_QUERY, &[])
        .await
        .map_err(|e| e.into_explorer("list databases", ExplorerError::Catalog))?;

    let names = rows.first_column();
    log::debug!("Listed {} databases", names.len());
    Ok(names)
}

/// Base tables of `database`; an empty vector means the database has none
pub async fn list_tables(session: &mut Session, database: &str) -> Result<Vec<String>> {
    let database = identifier::validate(database)
        .map_err(|e| ExplorerError::Catalog(format!("invalid database name: {}", e)))?;

    session
        .scope(database)
        .await
        .map_err(|e| e.into_explorer("list tables", ExplorerError::Catalog))?;

    let rows = session
        .query(BASE_TABLES_QUERY, &[])
        .await
        .map_err(|e| e.into_explorer("list tables", ExplorerError::Catalog))?;

    let names = rows.first_column();
    log::debug!("Listed {} tables in {}", names.len(), database);
    Ok(names)
}

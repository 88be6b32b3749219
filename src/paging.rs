// ABOUTME: Paged table reads for SQL Explorer
// ABOUTME: Turns (table, offset, limit) into an OFFSET/FETCH window with a stable ordering

use serde::{Deserialize, Serialize};

use crate::db::identifier::{self, quote};
use crate::error::{ExplorerError, Result};
use crate::models::ResultPage;
use crate::session::{CallError, Session};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Ordering used to make OFFSET/FETCH windows well defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RowOrdering {
    /// Order by the primary key when the table has one, otherwise `(SELECT NULL)`
    #[default]
    PrimaryKey,
    /// Always `ORDER BY (SELECT NULL)`. Rows may repeat or go missing
    /// between pages if the engine does not evaluate it deterministically.
    Unordered,
}

const NO_OP_ORDER: &str = "(SELECT NULL)";

// OBJECT_ID resolves the bracketed name exactly as SELECT * FROM does
const PRIMARY_KEY_QUERY: &str = "SELECT c.name \
     FROM sys.indexes i \
     JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
     JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
     WHERE i.is_primary_key = 1 AND i.object_id = OBJECT_ID(@P1) \
     ORDER BY ic.key_ordinal";

/// A page of a table, addressed by offset and limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub table: String,
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Page `page_number` (1-based) of `page_size` rows
    pub fn page(table: impl Into<String>, page_number: u64, page_size: u32) -> Result<Self> {
        if page_number == 0 {
            return Err(ExplorerError::Configuration(
                "page number starts at 1".to_string(),
            ));
        }
        if page_size == 0 {
            return Err(ExplorerError::Configuration(
                "page size must be positive".to_string(),
            ));
        }
        let offset = (page_number - 1)
            .checked_mul(u64::from(page_size))
            .ok_or_else(|| ExplorerError::Configuration("page number is too large".to_string()))?;

        Ok(Self {
            table: table.into(),
            offset,
            limit: u64::from(page_size),
        })
    }

    /// Page 1 with the default page size
    pub fn first(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            offset: 0,
            limit: u64::from(DEFAULT_PAGE_SIZE),
        }
    }
}

/// Fetches bounded row windows
#[derive(Debug, Clone, Copy, Default)]
pub struct PagedQueryExecutor {
    ordering: RowOrdering,
}

impl PagedQueryExecutor {
    pub fn new(ordering: RowOrdering) -> Self {
        Self { ordering }
    }

    pub fn ordering(&self) -> RowOrdering {
        self.ordering
    }

    pub async fn fetch(
        &self,
        session: &mut Session,
        database: &str,
        request: &PageRequest,
    ) -> Result<ResultPage> {
        self.fetch_page(session, database, &request.table, request.offset, request.limit)
            .await
    }

    /// Fetch at most `limit` rows of `table` starting after `offset` rows
    pub async fn fetch_page(
        &self,
        session: &mut Session,
        database: &str,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ResultPage> {
        if limit == 0 {
            return Err(ExplorerError::Configuration(
                "limit must be positive".to_string(),
            ));
        }
        if offset > i64::MAX as u64 || limit > i64::MAX as u64 {
            return Err(ExplorerError::Configuration(
                "offset and limit must fit in a BIGINT".to_string(),
            ));
        }
        let database = identifier::validate(database)
            .map_err(|e| ExplorerError::Query(format!("invalid database name: {}", e)))?;
        let table = identifier::validate(table)
            .map_err(|e| ExplorerError::Query(format!("invalid table name: {}", e)))?;

        session
            .scope(database)
            .await
            .map_err(|e| e.into_explorer("fetch page", ExplorerError::Query))?;

        let order_by = self.order_by(session, table).await?;
        let sql = window_query(table, &order_by, offset, limit);

        let mut rows = session
            .query(&sql, &[])
            .await
            .map_err(|e| e.into_explorer("fetch page", ExplorerError::Query))?;

        // FETCH NEXT already bounds the window; this guards transports that ignore it
        rows.rows.truncate(limit as usize);

        log::debug!(
            "Fetched {} rows from {}.{} at offset {}",
            rows.rows.len(),
            database,
            table,
            offset
        );

        Ok(ResultPage {
            table: table.to_string(),
            offset,
            columns: rows.columns,
            rows: rows.rows,
        })
    }

    async fn order_by(&self, session: &mut Session, table: &str) -> Result<String> {
        if self.ordering == RowOrdering::Unordered {
            return Ok(NO_OP_ORDER.to_string());
        }

        let quoted = quote(table);
        match session.query(PRIMARY_KEY_QUERY, &[quoted.as_str()]).await {
            Ok(keys) => {
                let columns = keys.first_column();
                if columns.is_empty() {
                    log::debug!("{} has no primary key, using unordered window", table);
                    Ok(NO_OP_ORDER.to_string())
                } else {
                    Ok(columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "))
                }
            }
            Err(CallError::Transport(e)) if !e.is_fatal() => {
                log::debug!("Primary key lookup for {} failed ({}), using unordered window", table, e);
                Ok(NO_OP_ORDER.to_string())
            }
            Err(e) => Err(e.into_explorer("fetch page", ExplorerError::Query)),
        }
    }
}

fn window_query(table: &str, order_by: &str, offset: u64, limit: u64) -> String {
    format!(
        "SELECT * FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        quote(table),
        order_by,
        offset,
        limit
    )
}

use crate::error::Result;
use crate::registry::Registry;
use media_api::{CatalogueError, FieldKind, Filter, RecordCatalogue, RecordType};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  image VARCHAR(100),
  fact_sheet VARCHAR(100),
  context_sheet VARCHAR(100),
  permission VARCHAR(100)
);

CREATE TABLE IF NOT EXISTS places (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS articles (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL,
  content TEXT NOT NULL DEFAULT '',
  image VARCHAR(100)
);

CREATE TABLE IF NOT EXISTS actions (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL,
  thumbnail VARCHAR(100),
  description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS partners (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  logo VARCHAR(100)
);

CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  logo VARCHAR(100)
);

CREATE TABLE IF NOT EXISTS editions (
  id INTEGER PRIMARY KEY,
  project_id INTEGER REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS documents (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL,
  content TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS form_files (
  id INTEGER PRIMARY KEY,
  entry_id INTEGER NOT NULL,
  file VARCHAR(100) NOT NULL
);
"#;

/// Record catalogue backed by the backend's SQLite database.
pub struct SqliteCatalogue {
    pool: Pool<SqliteConnectionManager>,
    registry: Registry,
}

impl SqliteCatalogue {
    /// Open an existing database read-only and check the registry against
    /// its schema. A missing file or table is an error, never an empty
    /// catalogue.
    pub fn open<P: AsRef<Path>>(path: P, registry: Registry) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        // fail fast instead of waiting for the pool's connection timeout
        Connection::open_with_flags(path, flags)?;
        let pool = Pool::new(SqliteConnectionManager::file(path).with_flags(flags))?;
        let catalogue = Self { pool, registry };
        catalogue.verify()?;
        Ok(catalogue)
    }

    /// Open or create a writable database, creating missing backend tables.
    pub fn create<P: AsRef<Path>>(path: P, registry: Registry) -> Result<Self> {
        let pool = Pool::new(SqliteConnectionManager::file(path))?;
        Self::init(pool, registry)
    }

    pub fn open_in_memory(registry: Registry) -> Result<Self> {
        // every in-memory connection is its own database
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;
        Self::init(pool, registry)
    }

    fn init(pool: Pool<SqliteConnectionManager>, registry: Registry) -> Result<Self> {
        let catalogue = Self { pool, registry };
        catalogue.connection()?.execute_batch(SCHEMA)?;
        catalogue.verify()?;
        Ok(catalogue)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every registered column must exist, and media columns must hold text.
    pub fn verify(&self) -> Result<()> {
        let conn = self.connection()?;
        for record in self.registry.record_types() {
            let columns = table_columns(&conn, &record.name)?;
            if columns.is_empty() {
                return Err(CatalogueError::UnknownRecord(record.name.clone()).into());
            }
            for field in &record.fields {
                let (_, declared) = columns
                    .iter()
                    .find(|(name, _)| name == &field.name)
                    .ok_or_else(|| CatalogueError::UnknownColumn {
                        record: record.name.clone(),
                        column: field.name.clone(),
                    })?;
                if field.kind != FieldKind::Other && !has_text_affinity(declared) {
                    return Err(CatalogueError::UnsupportedColumn {
                        record: record.name.clone(),
                        column: field.name.clone(),
                        declared: declared.clone(),
                    }
                    .into());
                }
            }
        }
        debug!(
            "catalogue schema verified for {} record types",
            self.registry.record_types().len()
        );
        Ok(())
    }
}

impl RecordCatalogue for SqliteCatalogue {
    fn record_types(&self) -> Vec<RecordType> {
        self.registry.record_types().to_vec()
    }

    fn column_values(
        &self,
        record: &RecordType,
        column: &str,
        filter: &Filter,
    ) -> std::result::Result<Vec<Option<String>>, CatalogueError> {
        // only registered types went through `verify`
        if self.registry.get(&record.name).is_none() {
            return Err(CatalogueError::UnknownRecord(record.name.clone()));
        }
        ensure_column(record, column)?;
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {}",
            quote_ident(column),
            quote_ident(&record.name),
            filter_sql(record, filter)?
        );
        let conn = self.pool.get().map_err(CatalogueError::backend)?;
        let mut stmt = conn.prepare(&sql).map_err(CatalogueError::backend)?;
        let mut rows = stmt.query([]).map_err(CatalogueError::backend)?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(CatalogueError::backend)? {
            match row.get_ref(0).map_err(CatalogueError::backend)? {
                ValueRef::Null => values.push(None),
                ValueRef::Text(bytes) => {
                    values.push(Some(String::from_utf8_lossy(bytes).into_owned()))
                }
                _ => {
                    return Err(CatalogueError::UnsupportedValue {
                        record: record.name.clone(),
                        column: column.to_string(),
                    })
                }
            }
        }
        Ok(values)
    }
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
    Ok(columns)
}

/// SQLite's rule for TEXT affinity.
fn has_text_affinity(declared: &str) -> bool {
    let declared = declared.to_ascii_uppercase();
    ["CHAR", "CLOB", "TEXT"]
        .iter()
        .any(|token| declared.contains(token))
}

fn ensure_column(record: &RecordType, column: &str) -> std::result::Result<(), CatalogueError> {
    match record.field(column) {
        Some(_) => Ok(()),
        None => Err(CatalogueError::UnknownColumn {
            record: record.name.clone(),
            column: column.to_string(),
        }),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn filter_sql(record: &RecordType, filter: &Filter) -> std::result::Result<String, CatalogueError> {
    Ok(match filter {
        Filter::All => "1".to_string(),
        Filter::NullOrEmpty(column) => {
            ensure_column(record, column)?;
            let column = quote_ident(column);
            format!("({column} IS NULL OR {column} = '')")
        }
        Filter::Not(inner) => format!("NOT {}", filter_sql(record, inner)?),
        Filter::Any(list) if list.is_empty() => "0".to_string(),
        Filter::Any(list) => {
            let parts = list
                .iter()
                .map(|f| filter_sql(record, f))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            format!("({})", parts.join(" OR "))
        }
    })
}

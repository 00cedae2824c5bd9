//! SQLite access to the host's reservation and customer tables.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params_from_iter, Connection};

use super::{DepartureQuery, DepartureSource, RecipientRow, SourceError};

const HOST_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customer (
    id TEXT PRIMARY KEY,
    last_name TEXT,
    salutation TEXT,
    email TEXT,
    country TEXT,
    customer_type TEXT
);
CREATE TABLE IF NOT EXISTS reservation (
    id TEXT PRIMARY KEY,
    customer_id TEXT REFERENCES customer(id),
    unit_category TEXT,
    arrival_at TEXT,
    departure_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reservation_departure_at ON reservation(departure_at);
"#;

/// Thread-safe handle on the host database.
#[derive(Clone)]
pub struct HostDatabase {
    connection: Arc<Mutex<Connection>>,
}

impl HostDatabase {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, SourceError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %db_path.display(), "Opening host database");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(HOST_SCHEMA)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, SourceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(HOST_SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the locked connection on the calling thread.
    pub fn execute<F, T>(&self, f: F) -> Result<T, SourceError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .connection
            .lock()
            .map_err(|e| SourceError::Lock(e.to_string()))?;
        Ok(f(&conn)?)
    }

    pub fn ping(&self) -> Result<(), SourceError> {
        self.execute(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
    }

    fn query_recipients_sync(
        conn: &Connection,
        query: &DepartureQuery,
    ) -> Result<Vec<RecipientRow>, rusqlite::Error> {
        let sql = recipients_sql(query.unit_categories.len(), query.customer_types.len());

        let mut bound: Vec<String> =
            Vec::with_capacity(2 + query.unit_categories.len() + query.customer_types.len());
        bound.push(query.window.start_sql());
        bound.push(query.window.end_sql());
        bound.extend(query.unit_categories.iter().cloned());
        bound.extend(query.customer_types.iter().cloned());

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
            Ok(RecipientRow {
                name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                salutation: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                email: row.get(2)?,
                country_code: row.get(3)?,
            })
        })?;
        rows.collect()
    }
}

/// `?first, ?first+1, ...` for an IN list of `count` bound values.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn recipients_sql(categories: usize, customer_types: usize) -> String {
    let category_list = placeholders(3, categories);
    let type_list = placeholders(3 + categories, customer_types);
    format!(
        r#"
        SELECT
            kd.last_name AS name,
            kd.salutation AS salutation,
            kd.email AS email,
            kd.country AS language
        FROM reservation res
        LEFT JOIN customer kd ON res.customer_id = kd.id
        WHERE res.departure_at >= ?1 AND res.departure_at < ?2
        AND res.unit_category IN ({category_list})
        AND kd.customer_type IN ({type_list})
        AND kd.email IS NOT NULL AND kd.email != ''
        ORDER BY res.departure_at, kd.last_name
        "#
    )
}

impl DepartureSource for HostDatabase {
    async fn fetch_recipients(
        &self,
        query: &DepartureQuery,
    ) -> Result<Vec<RecipientRow>, SourceError> {
        if query.unit_categories.is_empty() || query.customer_types.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.connection.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RecipientRow>, SourceError> {
            let conn = conn.lock().map_err(|e| SourceError::Lock(e.to_string()))?;
            Ok(Self::query_recipients_sync(&conn, &query)?)
        })
        .await?
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::DatabaseLocation;
use crate::error::{ApiError, ApiResult};

/// Schema version written to `PRAGMA user_version` by a fully migrated database.
pub const SCHEMA_VERSION: i64 = 6;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn configure_sqlite(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Apply PRAGMAs on init (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |r| r.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<(), rusqlite::Error> {
    if !column_exists(conn, table, column)? {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl};"))?;
    }
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            mailing_address1 TEXT,
            mailing_address2 TEXT,
            mailing_city TEXT,
            mailing_state TEXT,
            mailing_postal_code TEXT,
            mailing_country TEXT,
            physical_address1 TEXT,
            physical_address2 TEXT,
            physical_city TEXT,
            physical_state TEXT,
            physical_postal_code TEXT,
            physical_country TEXT,
            contact_email TEXT,
            company_phone TEXT
        );

        CREATE TABLE IF NOT EXISTS tax_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL DEFAULT 'llc',
            tax_id TEXT,
            country TEXT,
            region TEXT,
            default_tax_rate REAL NOT NULL DEFAULT 0,
            rates_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS notification_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            enable_email INTEGER NOT NULL DEFAULT 0,
            email_address TEXT,
            enable_sms INTEGER NOT NULL DEFAULT 0,
            phone_number TEXT
        );

        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            company TEXT,
            street TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            country TEXT,
            billing_street TEXT,
            billing_city TEXT,
            billing_state TEXT,
            billing_zip_code TEXT,
            billing_country TEXT,
            tax_id TEXT,
            payment_terms TEXT NOT NULL DEFAULT 'net30',
            credit_limit REAL,
            notes TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT
        );

        CREATE TABLE IF NOT EXISTS vendors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            email TEXT,
            phone TEXT,
            company TEXT,
            street TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            country TEXT,
            tax_id TEXT,
            payment_terms TEXT NOT NULL DEFAULT 'net30',
            category TEXT NOT NULL DEFAULT 'other',
            account_number TEXT,
            notes TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT
        );

        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_number TEXT NOT NULL UNIQUE,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            status TEXT NOT NULL DEFAULT 'draft',
            issue_date TEXT,
            due_date TEXT,
            payment_terms TEXT,
            notes TEXT,
            terms TEXT,
            tax_rate REAL NOT NULL DEFAULT 0,
            subtotal REAL NOT NULL DEFAULT 0,
            tax_total REAL NOT NULL DEFAULT 0,
            discount_total REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS invoice_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
            description TEXT NOT NULL,
            quantity REAL NOT NULL DEFAULT 1,
            rate REAL NOT NULL DEFAULT 0,
            tax_rate REAL
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            payment_method TEXT,
            reference_number TEXT,
            description TEXT,
            tax_deductible INTEGER NOT NULL DEFAULT 0,
            tag TEXT,
            vendor_id INTEGER REFERENCES vendors(id) ON DELETE SET NULL,
            customer_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
            created_at TEXT,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            payment_method TEXT,
            reference_number TEXT,
            notes TEXT,
            invoice_id INTEGER REFERENCES invoices(id) ON DELETE SET NULL,
            vendor_id INTEGER REFERENCES vendors(id) ON DELETE SET NULL,
            customer_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
            created_at TEXT,
            updated_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_invoices_customer_id ON invoices(customer_id);
        CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice_id ON invoice_items(invoice_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);
        CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(date);
        CREATE INDEX IF NOT EXISTS idx_customers_name ON customers(name);
        "#,
    )?;
    Ok(())
}

fn apply_migrations(conn: &Connection, legacy: bool) -> Result<(), rusqlite::Error> {
    let mut v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    // Databases created before versioning carry user_version 0 but already have tables.
    if v == 0 && legacy {
        v = 1;
    }

    if v == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        return Ok(());
    }

    if v < 2 {
        add_column_if_missing(conn, "invoices", "tax_rate", "REAL NOT NULL DEFAULT 0")?;
        add_column_if_missing(conn, "invoice_items", "tax_rate", "REAL")?;
        conn.execute_batch("PRAGMA user_version = 2;")?;
        v = 2;
    }

    if v < 3 {
        add_column_if_missing(conn, "expenses", "tag", "TEXT")?;
        conn.execute_batch("PRAGMA user_version = 3;")?;
        v = 3;
    }

    if v < 4 {
        // init_schema already created the table on this open; only the version moves.
        conn.execute_batch("PRAGMA user_version = 4;")?;
        v = 4;
    }

    if v < 5 {
        add_column_if_missing(conn, "vendors", "payment_terms", "TEXT NOT NULL DEFAULT 'net30'")?;
        add_column_if_missing(conn, "vendors", "category", "TEXT NOT NULL DEFAULT 'other'")?;
        add_column_if_missing(conn, "vendors", "account_number", "TEXT")?;
        conn.execute_batch("PRAGMA user_version = 5;")?;
        v = 5;
    }

    if v < 6 {
        let rewritten = conn.execute(
            "UPDATE invoices SET status = 'sent' WHERE LOWER(status) = 'overdue'",
            [],
        )?;
        if rewritten > 0 {
            tracing::info!(rewritten, "migrated legacy overdue invoices to sent");
        }
        conn.execute_batch("PRAGMA user_version = 6;")?;
    }

    Ok(())
}

pub fn app_meta_get(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_meta WHERE key = ?1",
        params![key],
        |r| r.get(0),
    )
    .optional()
}

pub fn app_meta_set(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_meta(key, value) VALUES(?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Brings a freshly opened connection to the current schema.
pub fn prepare_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    configure_sqlite(conn)?;
    let legacy = table_exists(conn, "invoices")?;
    init_schema(conn)?;
    apply_migrations(conn, legacy)?;
    if app_meta_get(conn, "created_at")?.is_none() {
        app_meta_set(conn, "created_at", &now_iso())?;
    }
    Ok(())
}

/// Shared handle to the single SQLite connection.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    write_lock: Arc<Mutex<()>>,
}

impl Db {
    pub fn open(location: &DatabaseLocation) -> Result<Self, DbError> {
        let conn = match location {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
        };
        prepare_connection(&conn)?;
        tracing::debug!(?location, "database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open(&DatabaseLocation::Memory)
    }

    pub async fn with_read<T, F>(&self, op_name: &'static str, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ApiResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ApiError::Internal("db mutex poisoned".to_string()))?;
            f(&guard).inspect_err(|e| log_db_error(op_name, e))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
    }

    pub async fn with_write<T, F>(&self, op_name: &'static str, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> ApiResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let write_lock = self.write_lock.clone();
        tokio::task::spawn_blocking(move || {
            let _wg = write_lock
                .lock()
                .map_err(|_| ApiError::Internal("write mutex poisoned".to_string()))?;
            let mut guard = conn
                .lock()
                .map_err(|_| ApiError::Internal("db mutex poisoned".to_string()))?;
            f(&mut guard).inspect_err(|e| log_db_error(op_name, e))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
    }
}

fn log_db_error(op_name: &'static str, err: &ApiError) {
    if let ApiError::Database(msg) = err {
        tracing::error!(op = op_name, error = %msg, "sqlite operation failed");
    }
}

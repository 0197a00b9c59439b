//! SQLite Data Provider
//!
//! Direct-store mode: answers every fetch with queries against the parking
//! database. Queries run on the blocking thread pool so the async runtime
//! never waits on disk.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    DataProvider, ProviderError, ProviderResult, SectionOccupancy, Snapshot, SpaceDetail, Ticket,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS seccion (
        id TEXT PRIMARY KEY,
        letra_seccion TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS espacio (
        id TEXT PRIMARY KEY,
        numero TEXT NOT NULL,
        estado INTEGER NOT NULL DEFAULT 1,
        seccion_id TEXT NOT NULL REFERENCES seccion(id)
    );
    CREATE TABLE IF NOT EXISTS vehiculo (
        id TEXT PRIMARY KEY,
        placa TEXT NOT NULL,
        marca TEXT,
        modelo TEXT
    );
    CREATE TABLE IF NOT EXISTS ticket (
        id TEXT PRIMARY KEY,
        fecha_ingreso TEXT NOT NULL,
        fecha_salida TEXT,
        vehiculo_id TEXT NOT NULL REFERENCES vehiculo(id),
        espacio_id TEXT NOT NULL REFERENCES espacio(id),
        detalle_pago_id TEXT
    );
    CREATE TABLE IF NOT EXISTS detalle_pago (
        id TEXT PRIMARY KEY,
        metodo TEXT,
        fecha_pago TEXT NOT NULL,
        pago_total REAL NOT NULL DEFAULT 0,
        ticket_id TEXT,
        pago_id TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_ticket_salida ON ticket(fecha_salida);
    CREATE INDEX IF NOT EXISTS idx_espacio_seccion ON espacio(seccion_id);
";

/// Data provider backed by a local SQLite database
pub struct SqliteProvider {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProvider {
    /// Open an existing database read-only
    pub fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ProviderError::Unavailable(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        tracing::info!(path = %path.display(), "Opened parking database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the parking tables if they do not exist
    pub fn init_schema(path: impl AsRef<Path>) -> ProviderResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> ProviderResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ProviderError::Unavailable("database lock poisoned".to_string()))?;
            f(&conn).map_err(ProviderError::from)
        })
        .await?
    }
}

#[async_trait]
impl DataProvider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_snapshot(&self) -> ProviderResult<Snapshot> {
        self.with_conn(|conn| {
            let (available, occupied, total): (u32, u32, u32) = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN estado = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN estado = 0 THEN 1 ELSE 0 END), 0),
                    COUNT(*)
                 FROM espacio",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let today: f64 = conn.query_row(
                "SELECT COALESCE(SUM(pago_total), 0.0) FROM detalle_pago
                 WHERE date(fecha_pago, 'localtime') = date('now', 'localtime')",
                [],
                |row| row.get(0),
            )?;

            let month: f64 = conn.query_row(
                "SELECT COALESCE(SUM(pago_total), 0.0) FROM detalle_pago
                 WHERE strftime('%Y-%m', fecha_pago, 'localtime')
                     = strftime('%Y-%m', 'now', 'localtime')",
                [],
                |row| row.get(0),
            )?;

            let active: u32 = conn.query_row(
                "SELECT COUNT(*) FROM ticket WHERE fecha_salida IS NULL",
                [],
                |row| row.get(0),
            )?;

            Ok(Snapshot::new(available, occupied, total)
                .revenue(today, month)
                .active_vehicles(active))
        })
        .await
    }

    async fn fetch_section_breakdown(&self) -> ProviderResult<Vec<SectionOccupancy>> {
        self.with_conn(|conn| {
            let mut sections_stmt = conn
                .prepare_cached("SELECT id, letra_seccion FROM seccion ORDER BY letra_seccion")?;
            let sections = sections_stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut spaces_stmt = conn.prepare_cached(
                "SELECT e.id, e.numero, e.estado, v.placa, t.fecha_ingreso
                 FROM espacio e
                 LEFT JOIN ticket t ON t.espacio_id = e.id AND t.fecha_salida IS NULL
                 LEFT JOIN vehiculo v ON v.id = t.vehiculo_id
                 WHERE e.seccion_id = ?
                 ORDER BY e.numero",
            )?;

            let mut breakdown = Vec::with_capacity(sections.len());
            for (section_id, letter) in sections {
                let spaces = spaces_stmt
                    .query_map(params![section_id], |row| {
                        let entered: Option<String> = row.get(4)?;
                        Ok(SpaceDetail {
                            id: row.get(0)?,
                            numero: row.get(1)?,
                            estado: row.get(2)?,
                            seccion_letra: letter.clone(),
                            vehiculo_placa: row.get(3)?,
                            hora_ingreso: entered
                                .map(|s| parse_timestamp(&s, 4).map(|dt| dt.to_rfc3339()))
                                .transpose()?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                breakdown.push(SectionOccupancy::from_spaces(letter, spaces));
            }

            Ok(breakdown)
        })
        .await
    }

    async fn fetch_available_spaces(&self) -> ProviderResult<Vec<SpaceDetail>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT e.id, e.numero, e.estado, COALESCE(s.letra_seccion, '')
                 FROM espacio e
                 LEFT JOIN seccion s ON s.id = e.seccion_id
                 WHERE e.estado = 1
                 ORDER BY e.numero",
            )?;

            let spaces = stmt
                .query_map([], |row| {
                    Ok(SpaceDetail {
                        id: row.get(0)?,
                        numero: row.get(1)?,
                        estado: row.get(2)?,
                        seccion_letra: row.get(3)?,
                        vehiculo_placa: None,
                        hora_ingreso: None,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(spaces)
        })
        .await
    }

    async fn fetch_active_tickets(&self) -> ProviderResult<Vec<Ticket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, fecha_ingreso, fecha_salida, vehiculo_id, espacio_id, detalle_pago_id
                 FROM ticket
                 WHERE fecha_salida IS NULL
                 ORDER BY fecha_ingreso DESC",
            )?;

            let tickets = stmt
                .query_map([], |row| {
                    let entered: String = row.get(1)?;
                    let left: Option<String> = row.get(2)?;
                    Ok(Ticket {
                        id: row.get(0)?,
                        fecha_ingreso: parse_timestamp(&entered, 1)?,
                        fecha_salida: left.map(|s| parse_timestamp(&s, 2)).transpose()?,
                        vehiculo_id: row.get(3)?,
                        espacio_id: row.get(4)?,
                        detalle_pago_id: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(tickets)
        })
        .await
    }

    async fn health_check(&self) -> ProviderResult<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }
}

/// Timestamps are stored as RFC 3339 or SQLite's `YYYY-MM-DD HH:MM:SS` in UTC
fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params, params_from_iter};

use crate::catalog::Catalog;
use crate::domain::{SnpFormat, VariantRecord};
use crate::error::SnpError;
use crate::normalize::Schema;

const BASE_COLUMNS: [&str; 5] = ["species", "set_name", "chromosome", "start", "end"];

pub const INDEX_COLUMNS: [&str; 3] = ["start", "chromosome", "set_name"];

pub struct SnpStore {
    conn: Connection,
}

impl SnpStore {
    pub fn open(path: &Utf8Path) -> Result<Self, SnpError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SnpError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, SnpError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SnpError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snp_sets (
                set_name TEXT PRIMARY KEY NOT NULL,
                format TEXT NOT NULL,
                species TEXT NOT NULL,
                genome_source TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                imported_at TEXT NOT NULL
            )",
        )?;
        let store = Self { conn };
        for format in SnpFormat::ALL {
            let Ok((table, schema)) = record_table(format) else {
                continue;
            };
            let columns = BASE_COLUMNS
                .iter()
                .map(|column| {
                    let kind = match *column {
                        "start" | "end" => "INTEGER NOT NULL",
                        _ => "TEXT NOT NULL",
                    };
                    format!("{} {kind}", quote(column))
                })
                .chain(
                    schema
                        .payload_columns()
                        .into_iter()
                        .map(|column| format!("{} TEXT", quote(column))),
                )
                .collect::<Vec<_>>()
                .join(", ");
            store
                .conn
                .execute_batch(&format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"))?;
            store.ensure_index(format)?;
        }
        Ok(store)
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.conn)
    }

    pub fn session(&mut self) -> Result<Session<'_>, SnpError> {
        Ok(Session {
            tx: self.conn.transaction()?,
            insert_sql: None,
        })
    }

    pub fn drop_index(&self, format: SnpFormat) -> Result<(), SnpError> {
        let (table, _) = record_table(format)?;
        self.conn
            .execute_batch(&format!("DROP INDEX IF EXISTS {}", index_name(table)))?;
        Ok(())
    }

    pub fn ensure_index(&self, format: SnpFormat) -> Result<(), SnpError> {
        let (table, _) = record_table(format)?;
        let columns = INDEX_COLUMNS.map(quote).join(", ");
        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({columns})",
            index_name(table)
        ))?;
        Ok(())
    }

    pub fn has_index(&self, format: SnpFormat) -> Result<bool, SnpError> {
        let (table, _) = record_table(format)?;
        index_exists(&self.conn, table)
    }

    pub fn count_records(&self, format: SnpFormat, set_name: &str) -> Result<u64, SnpError> {
        let (table, _) = record_table(format)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE set_name = ?1"),
            params![set_name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn records(&self, format: SnpFormat, set_name: &str) -> Result<Vec<VariantRecord>, SnpError> {
        let (table, schema) = record_table(format)?;
        let payload_columns = schema.payload_columns();
        let columns = BASE_COLUMNS
            .iter()
            .chain(payload_columns.iter())
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns} FROM {table} WHERE set_name = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![set_name], |row| {
            let mut payload = std::collections::BTreeMap::new();
            for (offset, column) in payload_columns.iter().enumerate() {
                if let Some(value) = row.get::<_, Option<String>>(BASE_COLUMNS.len() + offset)? {
                    payload.insert(*column, value);
                }
            }
            Ok(VariantRecord {
                species: row.get(0)?,
                set_name: row.get(1)?,
                chromosome: row.get(2)?,
                start: row.get(3)?,
                end: row.get(4)?,
                payload,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// One write transaction. Dropping it without [`Session::commit`] rolls
/// every change back.
pub struct Session<'c> {
    tx: Transaction<'c>,
    insert_sql: Option<(SnpFormat, String)>,
}

impl Session<'_> {
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.tx)
    }

    pub fn insert(&mut self, format: SnpFormat, record: &VariantRecord) -> Result<(), SnpError> {
        let (table, schema) = record_table(format)?;
        let payload_columns = schema.payload_columns();
        if self.insert_sql.as_ref().map(|(cached, _)| *cached) != Some(format) {
            self.insert_sql = Some((format, insert_sql(table, &payload_columns)));
        }
        let Some((_, sql)) = &self.insert_sql else {
            return Err(SnpError::Storage("insert statement unavailable".to_string()));
        };

        let values = [
            Value::Text(record.species.clone()),
            Value::Text(record.set_name.clone()),
            Value::Text(record.chromosome.clone()),
            Value::Integer(record.start),
            Value::Integer(record.end),
        ]
        .into_iter()
        .chain(payload_columns.iter().map(|column| {
            record
                .payload
                .get(column)
                .map(|value| Value::Text(value.clone()))
                .unwrap_or(Value::Null)
        }));
        self.tx.prepare_cached(sql)?.execute(params_from_iter(values))?;
        Ok(())
    }

    pub fn delete_set(&self, format: SnpFormat, set_name: &str) -> Result<u64, SnpError> {
        let (table, _) = record_table(format)?;
        let deleted = self.tx.execute(
            &format!("DELETE FROM {table} WHERE set_name = ?1"),
            params![set_name],
        )?;
        Ok(deleted as u64)
    }

    pub fn commit(self) -> Result<(), SnpError> {
        self.tx.commit()?;
        Ok(())
    }
}

fn record_table(format: SnpFormat) -> Result<(&'static str, &'static Schema), SnpError> {
    match (format.table(), Schema::for_format(format)) {
        (Some(table), Some(schema)) => Ok((table, schema)),
        _ => Err(SnpError::NotImplemented(format)),
    }
}

fn index_name(table: &str) -> String {
    format!("idx_{table}_start_chromosome_set")
}

fn index_exists(conn: &Connection, table: &str) -> Result<bool, SnpError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        params![index_name(table)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_sql(table: &str, payload_columns: &[&str]) -> String {
    let columns = BASE_COLUMNS
        .iter()
        .chain(payload_columns.iter())
        .map(|column| quote(column))
        .collect::<Vec<_>>();
    let placeholders = (1..=columns.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

fn quote(column: &str) -> String {
    format!("\"{column}\"")
}

pub fn default_database_path() -> Result<Utf8PathBuf, SnpError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".local")
                    .join("share")
                    .join("snp-import")
                    .join("snps.db"),
            )
            .ok()
        })
        .ok_or_else(|| SnpError::Filesystem("unable to resolve data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    fn record(set_name: &str, start: i64) -> VariantRecord {
        VariantRecord {
            species: "human".to_string(),
            set_name: set_name.to_string(),
            chromosome: "1".to_string(),
            start,
            end: start + 1,
            payload: BTreeMap::from([("alt", "T".to_string())]),
        }
    }

    #[test]
    fn fresh_store_has_indexes() {
        let store = SnpStore::open_in_memory().unwrap();
        assert!(store.has_index(SnpFormat::Tabular).unwrap());
        assert!(store.has_index(SnpFormat::Structured).unwrap());
    }

    #[test]
    fn drop_and_rebuild_index() {
        let store = SnpStore::open_in_memory().unwrap();
        store.drop_index(SnpFormat::Structured).unwrap();
        assert!(!store.has_index(SnpFormat::Structured).unwrap());
        assert!(store.has_index(SnpFormat::Tabular).unwrap());
        store.ensure_index(SnpFormat::Structured).unwrap();
        assert!(store.has_index(SnpFormat::Structured).unwrap());
    }

    #[test]
    fn uncommitted_session_rolls_back() {
        let mut store = SnpStore::open_in_memory().unwrap();
        {
            let mut session = store.session().unwrap();
            session.insert(SnpFormat::Structured, &record("a", 1)).unwrap();
            session.insert(SnpFormat::Structured, &record("a", 2)).unwrap();
        }
        assert_eq!(store.count_records(SnpFormat::Structured, "a").unwrap(), 0);

        let mut session = store.session().unwrap();
        session.insert(SnpFormat::Structured, &record("a", 1)).unwrap();
        session.commit().unwrap();
        assert_eq!(store.count_records(SnpFormat::Structured, "a").unwrap(), 1);
    }

    #[test]
    fn records_round_trip_payload() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut session = store.session().unwrap();
        session.insert(SnpFormat::Structured, &record("a", 7)).unwrap();
        session.insert(SnpFormat::Structured, &record("b", 8)).unwrap();
        session.commit().unwrap();

        let records = store.records(SnpFormat::Structured, "a").unwrap();
        assert_eq!(records, vec![record("a", 7)]);
    }

    #[test]
    fn delete_set_only_touches_that_set() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut session = store.session().unwrap();
        session.insert(SnpFormat::Tabular, &record("a", 1)).unwrap();
        session.insert(SnpFormat::Tabular, &record("b", 1)).unwrap();
        assert_eq!(session.delete_set(SnpFormat::Tabular, "a").unwrap(), 1);
        session.commit().unwrap();

        assert_eq!(store.count_records(SnpFormat::Tabular, "a").unwrap(), 0);
        assert_eq!(store.count_records(SnpFormat::Tabular, "b").unwrap(), 1);
    }

    #[test]
    fn placeholder_format_has_no_table() {
        let store = SnpStore::open_in_memory().unwrap();
        assert_matches!(
            store.count_records(SnpFormat::AlignmentDerived, "a"),
            Err(SnpError::NotImplemented(_))
        );
    }

    #[test]
    fn file_store_persists() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("db").join("snps.db")).unwrap();
        {
            let mut store = SnpStore::open(&path).unwrap();
            let mut session = store.session().unwrap();
            session.insert(SnpFormat::Tabular, &record("a", 3)).unwrap();
            session.commit().unwrap();
        }
        let store = SnpStore::open(&path).unwrap();
        assert_eq!(store.count_records(SnpFormat::Tabular, "a").unwrap(), 1);
    }
}

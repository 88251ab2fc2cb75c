use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::domain::SnpFormat;
use crate::error::SnpError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub set_name: String,
    pub format: SnpFormat,
    pub species: String,
    pub genome_source: String,
    pub record_count: u64,
    pub imported_at: String,
}

pub struct Catalog<'c> {
    conn: &'c Connection,
}

impl<'c> Catalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn exists(&self, set_name: &str) -> Result<bool, SnpError> {
        Ok(self.find(set_name)?.is_some())
    }

    pub fn find(&self, set_name: &str) -> Result<Option<CatalogEntry>, SnpError> {
        self.conn
            .query_row(
                "SELECT set_name, format, species, genome_source, record_count, imported_at
                 FROM snp_sets WHERE set_name = ?1",
                params![set_name],
                read_entry,
            )
            .optional()?
            .transpose()
    }

    pub fn lookup(&self, set_name: &str) -> Result<CatalogEntry, SnpError> {
        self.find(set_name)?
            .ok_or_else(|| SnpError::SetNotFound(set_name.to_string()))
    }

    pub fn register(&self, entry: &CatalogEntry) -> Result<(), SnpError> {
        if self.exists(&entry.set_name)? {
            return Err(SnpError::DuplicateSet(entry.set_name.clone()));
        }
        self.conn.execute(
            "INSERT INTO snp_sets (set_name, format, species, genome_source, record_count, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.set_name,
                entry.format.tag(),
                entry.species,
                entry.genome_source,
                entry.record_count as i64,
                entry.imported_at,
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, set_name: &str) -> Result<(), SnpError> {
        let removed = self
            .conn
            .execute("DELETE FROM snp_sets WHERE set_name = ?1", params![set_name])?;
        if removed == 0 {
            return Err(SnpError::SetNotFound(set_name.to_string()));
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<CatalogEntry>, SnpError> {
        let mut stmt = self.conn.prepare(
            "SELECT set_name, format, species, genome_source, record_count, imported_at
             FROM snp_sets ORDER BY set_name",
        )?;
        let rows = stmt.query_map([], read_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<Result<CatalogEntry, SnpError>> {
    let tag: String = row.get(1)?;
    let Ok(format) = tag.parse::<SnpFormat>() else {
        return Ok(Err(SnpError::Storage(format!(
            "unknown format tag in catalog: {tag}"
        ))));
    };
    let record_count: i64 = row.get(4)?;
    Ok(Ok(CatalogEntry {
        set_name: row.get(0)?,
        format,
        species: row.get(2)?,
        genome_source: row.get(3)?,
        record_count: record_count as u64,
        imported_at: row.get(5)?,
    }))
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::CatalogEntry;
use crate::domain::SnpFormat;
use crate::error::SnpError;
use crate::normalize::{Normalizer, SetContext};
use crate::source::RecordSource;
use crate::store::SnpStore;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadTarget<'a> {
    pub set_name: &'a str,
    pub species: &'a str,
    pub genome_source: &'a str,
    pub format: SnpFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub records: u64,
    pub missing_fields: BTreeMap<&'static str, u64>,
    pub indexed: bool,
}

pub struct BulkLoader {
    progress_interval: u64,
    cancel: CancelFlag,
}

impl BulkLoader {
    pub fn new(progress_interval: u64, cancel: CancelFlag) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
            cancel,
        }
    }

    pub fn load(
        &self,
        store: &mut SnpStore,
        source: &mut dyn RecordSource,
        normalizer: &dyn Normalizer,
        target: LoadTarget<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<LoadSummary, SnpError> {
        let format = target.format;
        if normalizer.schema().format != format {
            return Err(SnpError::Storage(format!(
                "normalizer for {} cannot load {format} records",
                normalizer.schema().format
            )));
        }
        if store.catalog().exists(target.set_name)? {
            return Err(SnpError::DuplicateSet(target.set_name.to_string()));
        }

        info!(
            set = target.set_name,
            species = target.species,
            %format,
            "importing SNP set"
        );
        let started = Instant::now();
        let context = SetContext {
            species: target.species,
            set_name: target.set_name,
        };
        let total = source.len_hint();

        sink.event(ProgressEvent {
            message: "phase=Prepare; dropping index".to_string(),
            elapsed: None,
        });
        store.drop_index(format)?;

        let mut session = store.session()?;
        let mut records = 0u64;
        let mut missing_fields = BTreeMap::<&'static str, u64>::new();
        let mut current_chromosome: Option<String> = None;

        for raw in source {
            if self.cancel.is_cancelled() {
                warn!(set = target.set_name, records, "import cancelled, rolling back");
                return Err(SnpError::Cancelled);
            }
            let record_no = records + 1;
            let normalized = normalizer
                .normalize(&raw?, &context)
                .map_err(|source| SnpError::Normalization {
                    record: record_no,
                    source,
                })?;

            for missing in normalized.warnings {
                let count = missing_fields.entry(missing.0).or_insert(0);
                if *count == 0 {
                    warn!(field = missing.0, "SNP file has no field {}, leaving it empty", missing.0);
                }
                *count += 1;
            }

            let chromosome = &normalized.record.chromosome;
            if current_chromosome.as_ref() != Some(chromosome) {
                debug!(chromosome = %chromosome, "loading chromosome");
                sink.event(ProgressEvent {
                    message: format!("phase=Load; chr {chromosome}"),
                    elapsed: Some(started.elapsed()),
                });
                current_chromosome = Some(chromosome.clone());
            }

            session.insert(format, &normalized.record)?;
            records = record_no;

            if records % self.progress_interval == 0 {
                let message = match total {
                    Some(total) => format!("phase=Load; {records}/{total} records"),
                    None => format!("phase=Load; {records} records"),
                };
                sink.event(ProgressEvent {
                    message,
                    elapsed: Some(started.elapsed()),
                });
            }
        }

        session.catalog().register(&CatalogEntry {
            set_name: target.set_name.to_string(),
            format,
            species: target.species.to_string(),
            genome_source: target.genome_source.to_string(),
            record_count: records,
            imported_at: chrono::Utc::now().to_rfc3339(),
        })?;

        sink.event(ProgressEvent {
            message: "phase=Commit; saving".to_string(),
            elapsed: Some(started.elapsed()),
        });
        session.commit()?;

        sink.event(ProgressEvent {
            message: "phase=Index; creating indexes".to_string(),
            elapsed: Some(started.elapsed()),
        });
        // Records are committed; a failed rebuild is not a failed import.
        let indexed = match store.ensure_index(format) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    set = target.set_name,
                    error = %err,
                    "SNP set committed but index rebuild failed; it is retried when the store is reopened"
                );
                false
            }
        };

        info!(
            set = target.set_name,
            records,
            indexed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SNP set imported"
        );
        Ok(LoadSummary {
            records,
            missing_fields,
            indexed,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::RawRecord;
    use crate::error::NormalizeError;
    use crate::normalize::{StructuredNormalizer, TabularNormalizer};
    use crate::output::JsonOutput;
    use crate::source::VecSource;

    fn tabular(rows: &[(&str, i64, i64)]) -> VecSource {
        VecSource::new(
            rows.iter()
                .map(|(chrom, start, end)| {
                    RawRecord::from([
                        ("chromosomeNumber".to_string(), chrom.to_string()),
                        ("start".to_string(), start.to_string()),
                        ("end".to_string(), end.to_string()),
                    ])
                })
                .collect(),
        )
    }

    fn target(format: SnpFormat) -> LoadTarget<'static> {
        LoadTarget {
            set_name: "testSet",
            species: "human",
            genome_source: "GRCh37",
            format,
        }
    }

    #[test]
    fn loads_commits_registers_and_reindexes() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut source = tabular(&[("1", 5, 5), ("1", 10, 12), ("2", 7, 7)]);
        let loader = BulkLoader::new(DEFAULT_PROGRESS_INTERVAL, CancelFlag::new());

        let summary = loader
            .load(
                &mut store,
                &mut source,
                &TabularNormalizer,
                target(SnpFormat::Tabular),
                &JsonOutput,
            )
            .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.missing_fields.get("ref"), Some(&3));
        let starts: Vec<_> = store
            .records(SnpFormat::Tabular, "testSet")
            .unwrap()
            .iter()
            .map(|record| record.start)
            .collect();
        assert_eq!(starts, vec![4, 9, 6]);
        let entry = store.catalog().lookup("testSet").unwrap();
        assert_eq!(entry.format, SnpFormat::Tabular);
        assert_eq!(entry.record_count, 3);
        assert!(summary.indexed);
        assert!(store.has_index(SnpFormat::Tabular).unwrap());
    }

    #[test]
    fn failing_record_rolls_back_everything() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut source = tabular(&[("1", 5, 5), ("1", 0, 3), ("1", 7, 7)]);
        let loader = BulkLoader::new(DEFAULT_PROGRESS_INTERVAL, CancelFlag::new());

        let err = loader
            .load(
                &mut store,
                &mut source,
                &TabularNormalizer,
                target(SnpFormat::Tabular),
                &JsonOutput,
            )
            .unwrap_err();

        assert_matches!(
            err,
            SnpError::Normalization {
                record: 2,
                source: NormalizeError::InvalidValue { field: "start", .. }
            }
        );
        assert_eq!(store.count_records(SnpFormat::Tabular, "testSet").unwrap(), 0);
        assert!(!store.catalog().exists("testSet").unwrap());
        assert!(!store.has_index(SnpFormat::Tabular).unwrap());
    }

    #[test]
    fn cancelled_load_rolls_back() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut source = tabular(&[("1", 5, 5)]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let loader = BulkLoader::new(DEFAULT_PROGRESS_INTERVAL, cancel);

        let err = loader
            .load(
                &mut store,
                &mut source,
                &TabularNormalizer,
                target(SnpFormat::Tabular),
                &JsonOutput,
            )
            .unwrap_err();

        assert_matches!(err, SnpError::Cancelled);
        assert!(!store.catalog().exists("testSet").unwrap());
    }

    #[test]
    fn mismatched_normalizer_is_rejected_before_writing() {
        let mut store = SnpStore::open_in_memory().unwrap();
        let mut source = tabular(&[("1", 5, 5)]);
        let loader = BulkLoader::new(DEFAULT_PROGRESS_INTERVAL, CancelFlag::new());

        let err = loader
            .load(
                &mut store,
                &mut source,
                &StructuredNormalizer,
                target(SnpFormat::Tabular),
                &JsonOutput,
            )
            .unwrap_err();

        assert_matches!(err, SnpError::Storage(_));
        assert!(store.has_index(SnpFormat::Tabular).unwrap());
    }
}

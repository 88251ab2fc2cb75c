use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::Package;
use crate::catalog::CatalogEntry;
use crate::config::ResolvedConfig;
use crate::domain::{SetName, SnpFormat, Species};
use crate::error::SnpError;
use crate::loader::{BulkLoader, CancelFlag, LoadTarget};
use crate::manifest::Manifest;
use crate::normalize::normalizer_for;
use crate::source::open_source;
use crate::store::SnpStore;

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub set_name: String,
    pub format: SnpFormat,
    pub species: String,
    pub genome_source: String,
    pub package_infos: BTreeMap<String, String>,
    pub records: u64,
    pub missing_fields: BTreeMap<&'static str, u64>,
    pub indexed: bool,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub items: Vec<DeleteItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteItemResult {
    pub set_name: String,
    pub deleted: bool,
    pub records_removed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub sets: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub stored_records: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App {
    store: SnpStore,
    work_dir: Option<Utf8PathBuf>,
    progress_interval: u64,
    cancel: CancelFlag,
}

impl App {
    pub fn with_config(store: SnpStore, config: &ResolvedConfig) -> Self {
        Self {
            store,
            work_dir: config.work_dir.clone(),
            progress_interval: config.progress_interval,
            cancel: CancelFlag::new(),
        }
    }

    pub fn store(&self) -> &SnpStore {
        &self.store
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn import_set(
        &mut self,
        archive: &Path,
        options: ImportOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ImportReport, SnpError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; opening package {}", archive.display()),
            elapsed: None,
        });
        let package = Package::open(archive, self.work_dir.as_deref().map(|dir| dir.as_std_path()))?;
        let manifest = Manifest::read(package.root())?;

        let set_name: SetName = manifest.set_name.parse()?;
        let species = Species::new(&manifest.species);
        if self.store.catalog().exists(set_name.as_str())? {
            return Err(SnpError::DuplicateSet(set_name.to_string()));
        }

        let format: SnpFormat = manifest.set_type.parse()?;
        let normalizer = normalizer_for(format)?;
        let snps_path = package.resolve_file(&manifest.snps_filename)?;
        info!(
            set = %set_name,
            %format,
            species = %species,
            source = %manifest.genome_source,
            file = %snps_path.display(),
            "resolved SNP package"
        );

        let mut report = ImportReport {
            set_name: set_name.to_string(),
            format,
            species: species.to_string(),
            genome_source: manifest.genome_source.clone(),
            package_infos: manifest.package_infos.clone(),
            records: 0,
            missing_fields: BTreeMap::new(),
            indexed: false,
            dry_run: options.dry_run,
            elapsed_ms: 0,
        };
        if options.dry_run {
            sink.event(ProgressEvent {
                message: "phase=Verify; dry run, nothing written".to_string(),
                elapsed: Some(started.elapsed()),
            });
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let mut source = open_source(format, &snps_path)?;
        let loader = BulkLoader::new(self.progress_interval, self.cancel.clone());
        let summary = loader.load(
            &mut self.store,
            source.as_mut(),
            normalizer,
            LoadTarget {
                set_name: set_name.as_str(),
                species: species.as_str(),
                genome_source: &manifest.genome_source,
                format,
            },
            sink,
        )?;

        report.records = summary.records;
        report.missing_fields = summary.missing_fields;
        report.indexed = summary.indexed;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    pub fn delete_set(&mut self, set_name: &str, sink: &dyn ProgressSink) -> Result<bool, SnpError> {
        Ok(self.delete_one(set_name, sink)?.is_some())
    }

    pub fn delete_sets(
        &mut self,
        set_names: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<DeleteResult, SnpError> {
        let mut items = Vec::with_capacity(set_names.len());
        for set_name in set_names {
            let removed = self.delete_one(set_name, sink)?;
            items.push(DeleteItemResult {
                set_name: set_name.clone(),
                deleted: removed.is_some(),
                records_removed: removed.unwrap_or(0),
            });
        }
        Ok(DeleteResult { items })
    }

    pub fn list_sets(&self) -> Result<ListResult, SnpError> {
        Ok(ListResult {
            sets: self.store.catalog().list()?,
        })
    }

    pub fn info(&self, set_name: &str) -> Result<InfoResult, SnpError> {
        let entry = self.store.catalog().lookup(set_name)?;
        let stored_records = self.store.count_records(entry.format, set_name)?;
        Ok(InfoResult {
            entry,
            stored_records,
        })
    }

    fn delete_one(&mut self, set_name: &str, sink: &dyn ProgressSink) -> Result<Option<u64>, SnpError> {
        let set_name: SetName = set_name.parse()?;
        let set_name = set_name.as_str();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {set_name}"),
            elapsed: None,
        });
        let session = self.store.session()?;
        let Some(entry) = session.catalog().find(set_name)? else {
            warn!(
                set = set_name,
                "can't delete SNP set {set_name}: no set by that name"
            );
            return Ok(None);
        };

        sink.event(ProgressEvent {
            message: format!("phase=Store; deleting {set_name}"),
            elapsed: None,
        });
        let removed = session.delete_set(entry.format, set_name)?;
        session.catalog().remove(set_name)?;
        session.commit()?;
        info!(set = set_name, records = removed, "SNP set deleted");
        Ok(Some(removed))
    }
}

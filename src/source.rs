use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::domain::{RawRecord, SnpFormat};
use crate::error::SnpError;

pub trait RecordSource: Iterator<Item = Result<RawRecord, SnpError>> {
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

pub fn open_source(format: SnpFormat, path: &Path) -> Result<Box<dyn RecordSource>, SnpError> {
    match format {
        SnpFormat::Tabular => Ok(Box::new(CasavaSource::open(path)?)),
        SnpFormat::Structured => Ok(Box::new(VcfSource::open(path)?)),
        SnpFormat::AlignmentDerived => Err(SnpError::NotImplemented(format)),
    }
}

pub struct VecSource {
    records: std::vec::IntoIter<RawRecord>,
    len: u64,
}

impl VecSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        let len = records.len() as u64;
        Self {
            records: records.into_iter(),
            len,
        }
    }
}

impl Iterator for VecSource {
    type Item = Result<RawRecord, SnpError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}

impl RecordSource for VecSource {
    fn len_hint(&self) -> Option<u64> {
        Some(self.len)
    }
}

const CASAVA_COLUMNS_MARKER: &str = "#$ COLUMNS";

const CASAVA_DEFAULT_COLUMNS: &[&str] = &[
    "seq_name",
    "pos",
    "bcalls_used",
    "bcalls_filt",
    "ref",
    "Q(snp)",
    "max_gt",
    "Q(max_gt)",
    "max_gt|poly_site",
    "Q(max_gt|poly_site)",
    "A_used",
    "C_used",
    "G_used",
    "T_used",
];

pub struct CasavaSource {
    lines: LineReader,
    columns: Vec<String>,
    total: u64,
}

impl CasavaSource {
    pub fn open(path: &Path) -> Result<Self, SnpError> {
        let total = count_casava_rows(path)?;
        Ok(Self {
            lines: LineReader::open(path)?,
            columns: CASAVA_DEFAULT_COLUMNS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            total,
        })
    }
}

impl Iterator for CasavaSource {
    type Item = Result<RawRecord, SnpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next_line()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix(CASAVA_COLUMNS_MARKER) {
                self.columns = header.split_whitespace().map(str::to_string).collect();
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut record = RawRecord::new();
            for (column, value) in self.columns.iter().zip(trimmed.split_whitespace()) {
                for key in casava_keys(column) {
                    record.insert(key.to_string(), value.to_string());
                }
            }
            return Some(Ok(record));
        }
    }
}

impl RecordSource for CasavaSource {
    fn len_hint(&self) -> Option<u64> {
        Some(self.total)
    }
}

fn casava_keys(column: &str) -> Vec<&str> {
    match column {
        "seq_name" => vec!["chromosomeNumber"],
        "pos" => vec!["start", "end"],
        "Q(snp)" => vec!["QSNP"],
        "Q(max_gt)" => vec!["Qmax_gt"],
        "max_gt|poly_site" => vec!["max_gt_poly_site"],
        "Q(max_gt|poly_site)" => vec!["Qmax_gt_poly_site"],
        other => vec![other],
    }
}

fn count_casava_rows(path: &Path) -> Result<u64, SnpError> {
    let mut lines = LineReader::open(path)?;
    let mut total = 0;
    while let Some(line) = lines.next_line() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            total += 1;
        }
    }
    Ok(total)
}

pub struct VcfSource {
    lines: LineReader,
    columns: Option<Vec<String>>,
}

impl VcfSource {
    pub fn open(path: &Path) -> Result<Self, SnpError> {
        Ok(Self {
            lines: LineReader::open(path)?,
            columns: None,
        })
    }
}

impl Iterator for VcfSource {
    type Item = Result<RawRecord, SnpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next_line()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() || line.starts_with("##") {
                continue;
            }
            if line.starts_with("#CHROM") {
                self.columns = Some(line.split('\t').map(str::to_string).collect());
                continue;
            }

            let Some(columns) = &self.columns else {
                return Some(Err(self.lines.error("data line before #CHROM header")));
            };
            let record = columns
                .iter()
                .zip(line.split('\t'))
                .map(|(column, value)| (column.clone(), value.to_string()))
                .collect();
            return Some(Ok(record));
        }
    }
}

impl RecordSource for VcfSource {}

struct LineReader {
    inner: Box<dyn BufRead>,
    path: PathBuf,
    line_no: u64,
}

impl LineReader {
    fn open(path: &Path) -> Result<Self, SnpError> {
        let file = File::open(path)
            .map_err(|err| SnpError::Source(format!("open {}: {err}", path.display())))?;
        let mut reader = BufReader::new(file);
        let is_gzip = reader
            .fill_buf()
            .map(|buf| buf.starts_with(&[0x1f, 0x8b]))
            .map_err(|err| SnpError::Source(format!("read {}: {err}", path.display())))?;
        let inner: Box<dyn BufRead> = if is_gzip {
            Box::new(BufReader::new(MultiGzDecoder::new(reader)))
        } else {
            Box::new(reader)
        };
        Ok(Self {
            inner,
            path: path.to_path_buf(),
            line_no: 0,
        })
    }

    fn next_line(&mut self) -> Option<Result<String, SnpError>> {
        let mut line = String::new();
        match self.inner.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                Some(Ok(line))
            }
            Err(err) => Some(Err(self.error(&err.to_string()))),
        }
    }

    fn error(&self, message: &str) -> SnpError {
        SnpError::Source(format!(
            "{}:{}: {message}",
            self.path.display(),
            self.line_no
        ))
    }
}

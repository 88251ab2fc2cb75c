use std::collections::BTreeMap;

use crate::domain::{RawRecord, SnpFormat, VariantRecord};
use crate::error::{NormalizeError, SnpError};

pub const CHROMOSOME: &str = "chromosome";
pub const START: &str = "start";
pub const END: &str = "end";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub raw_key: &'static str,
    pub column: &'static str,
    pub required: bool,
}

const fn required(raw_key: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        raw_key,
        column,
        required: true,
    }
}

const fn optional(raw_key: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        raw_key,
        column,
        required: false,
    }
}

#[derive(Debug)]
pub struct Schema {
    pub format: SnpFormat,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn for_format(format: SnpFormat) -> Option<&'static Schema> {
        match format {
            SnpFormat::Tabular => Some(&TABULAR_SCHEMA),
            SnpFormat::Structured => Some(&STRUCTURED_SCHEMA),
            SnpFormat::AlignmentDerived => None,
        }
    }

    pub fn required_keys(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.raw_key)
            .collect()
    }

    pub fn optional_keys(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|field| !field.required)
            .map(|field| field.raw_key)
            .collect()
    }

    pub fn payload_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .map(|field| field.column)
            .filter(|column| ![CHROMOSOME, START, END].contains(column))
            .collect()
    }
}

pub static TABULAR_SCHEMA: Schema = Schema {
    format: SnpFormat::Tabular,
    fields: &[
        required("chromosomeNumber", CHROMOSOME),
        required("start", START),
        required("end", END),
        optional("bcalls_used", "bcalls_used"),
        optional("bcalls_filt", "bcalls_filt"),
        optional("ref", "ref_allele"),
        optional("QSNP", "qsnp"),
        optional("max_gt", "max_gt"),
        optional("Qmax_gt", "qmax_gt"),
        optional("max_gt_poly_site", "max_gt_poly_site"),
        optional("Qmax_gt_poly_site", "qmax_gt_poly_site"),
        optional("A_used", "a_used"),
        optional("C_used", "c_used"),
        optional("G_used", "g_used"),
        optional("T_used", "t_used"),
    ],
};

pub static STRUCTURED_SCHEMA: Schema = Schema {
    format: SnpFormat::Structured,
    fields: &[
        required("#CHROM", CHROMOSOME),
        required("POS", START),
        optional("ID", "snp_id"),
        optional("REF", "ref_allele"),
        required("ALT", "alt"),
        optional("QUAL", "qual"),
        optional("FILTER", "filter"),
        optional("INFO", "info"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissingField(pub &'static str);

#[derive(Debug, Clone, Copy)]
pub struct SetContext<'a> {
    pub species: &'a str,
    pub set_name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub record: VariantRecord,
    pub warnings: Vec<MissingField>,
}

pub trait Normalizer {
    fn schema(&self) -> &'static Schema;

    fn normalize(
        &self,
        raw: &RawRecord,
        context: &SetContext<'_>,
    ) -> Result<Normalized, NormalizeError>;
}

pub struct TabularNormalizer;

pub struct StructuredNormalizer;

pub fn normalizer_for(format: SnpFormat) -> Result<&'static dyn Normalizer, SnpError> {
    match format {
        SnpFormat::Tabular => Ok(&TabularNormalizer),
        SnpFormat::Structured => Ok(&StructuredNormalizer),
        SnpFormat::AlignmentDerived => Err(SnpError::NotImplemented(format)),
    }
}

impl Normalizer for TabularNormalizer {
    fn schema(&self) -> &'static Schema {
        &TABULAR_SCHEMA
    }

    fn normalize(
        &self,
        raw: &RawRecord,
        context: &SetContext<'_>,
    ) -> Result<Normalized, NormalizeError> {
        let copied = copy_fields(self.schema(), raw)?;
        let start = parse_position("start", copied.start)? - 1;
        let end = parse_position("end", copied.end)? - 1;
        copied.finish(context, start, end)
    }
}

impl Normalizer for StructuredNormalizer {
    fn schema(&self) -> &'static Schema {
        &STRUCTURED_SCHEMA
    }

    fn normalize(
        &self,
        raw: &RawRecord,
        context: &SetContext<'_>,
    ) -> Result<Normalized, NormalizeError> {
        let copied = copy_fields(self.schema(), raw)?;
        let start = parse_position("POS", copied.start)? - 1;
        let alt = copied.payload.get("alt").map(String::as_str).unwrap_or_default();
        let end = i64::try_from(alt.len())
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(|| NormalizeError::InvalidValue {
                field: "ALT",
                value: alt.to_string(),
            })?;
        copied.finish(context, start, end)
    }
}

struct Copied<'r> {
    chromosome: Option<&'r str>,
    start: Option<&'r str>,
    end: Option<&'r str>,
    payload: BTreeMap<&'static str, String>,
    warnings: Vec<MissingField>,
}

impl Copied<'_> {
    fn finish(
        self,
        context: &SetContext<'_>,
        start: i64,
        end: i64,
    ) -> Result<Normalized, NormalizeError> {
        if start < 0 || start > end {
            return Err(NormalizeError::InvalidCoordinates { start, end });
        }
        let chromosome = self
            .chromosome
            .ok_or(NormalizeError::MissingField(CHROMOSOME))?;
        Ok(Normalized {
            record: VariantRecord {
                species: context.species.to_string(),
                set_name: context.set_name.to_string(),
                chromosome: chromosome.trim().to_string(),
                start,
                end,
                payload: self.payload,
            },
            warnings: self.warnings,
        })
    }
}

fn copy_fields<'r>(schema: &Schema, raw: &'r RawRecord) -> Result<Copied<'r>, NormalizeError> {
    let mut copied = Copied {
        chromosome: None,
        start: None,
        end: None,
        payload: BTreeMap::new(),
        warnings: Vec::new(),
    };
    for field in schema.fields {
        let Some(value) = raw.get(field.raw_key) else {
            if field.required {
                return Err(NormalizeError::MissingField(field.raw_key));
            }
            copied.warnings.push(MissingField(field.raw_key));
            continue;
        };
        match field.column {
            CHROMOSOME => copied.chromosome = Some(value.as_str()),
            START => copied.start = Some(value.as_str()),
            END => copied.end = Some(value.as_str()),
            column => {
                copied.payload.insert(column, value.clone());
            }
        }
    }
    Ok(copied)
}

fn parse_position(field: &'static str, value: Option<&str>) -> Result<i64, NormalizeError> {
    let value = value.ok_or(NormalizeError::MissingField(field))?;
    match value.trim().parse::<i64>() {
        Ok(position) if position >= 1 => Ok(position),
        _ => Err(NormalizeError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SnpError;

pub type RawRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnpFormat {
    #[serde(rename = "tabular-variant")]
    Tabular,
    #[serde(rename = "structured-variant")]
    Structured,
    #[serde(rename = "alignment-derived")]
    AlignmentDerived,
}

impl SnpFormat {
    pub const ALL: [SnpFormat; 3] = [
        SnpFormat::Tabular,
        SnpFormat::Structured,
        SnpFormat::AlignmentDerived,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            SnpFormat::Tabular => "tabular-variant",
            SnpFormat::Structured => "structured-variant",
            SnpFormat::AlignmentDerived => "alignment-derived",
        }
    }

    pub fn table(self) -> Option<&'static str> {
        match self {
            SnpFormat::Tabular => Some("casava_snps"),
            SnpFormat::Structured => Some("dbsnp_snps"),
            SnpFormat::AlignmentDerived => None,
        }
    }
}

impl fmt::Display for SnpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for SnpFormat {
    type Err = SnpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tabular-variant" | "casava" | "casavasnp" => Ok(SnpFormat::Tabular),
            "structured-variant" | "dbsnp" | "dbsnpsnp" | "vcf" => Ok(SnpFormat::Structured),
            "alignment-derived" | "tophat" | "tophatsnp" => Ok(SnpFormat::AlignmentDerived),
            _ => Err(SnpError::UnsupportedFormat(value.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetName(String);

impl SetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SetName {
    type Err = SnpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= 255
            && !normalized.chars().any(|ch| ch.is_control());
        if !is_valid {
            return Err(SnpError::InvalidSetName(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species(String);

impl Species {
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantRecord {
    pub species: String,
    pub set_name: String,
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub payload: BTreeMap<&'static str, String>,
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::SnpError;

pub const MANIFEST_FILE: &str = "manifest.ini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub package_infos: BTreeMap<String, String>,
    pub set_name: String,
    pub set_type: String,
    pub species: String,
    pub genome_source: String,
    pub snps_filename: String,
}

impl Manifest {
    pub fn read(package_dir: &Path) -> Result<Self, SnpError> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|err| SnpError::Manifest(format!("{}: {err}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SnpError> {
        let sections = parse_ini(content)?;
        let get = |section: &str, key: &str| -> Result<String, SnpError> {
            sections
                .get(section)
                .ok_or_else(|| SnpError::Manifest(format!("missing section [{section}]")))?
                .get(key)
                .map(|value| value.trim().to_string())
                .ok_or_else(|| SnpError::Manifest(format!("missing key {key} in [{section}]")))
        };

        Ok(Self {
            package_infos: sections.get("package_infos").cloned().unwrap_or_default(),
            set_name: get("set_infos", "name")?,
            set_type: get("set_infos", "type")?,
            species: get("set_infos", "specie")?,
            genome_source: get("set_infos", "source")?,
            snps_filename: get("snps", "filename")?,
        })
    }
}

type Sections = BTreeMap<String, BTreeMap<String, String>>;

fn parse_ini(content: &str) -> Result<Sections, SnpError> {
    let section_re = Regex::new(r"^\[\s*([^\]]+?)\s*\]$")
        .map_err(|err| SnpError::Manifest(err.to_string()))?;
    let entry_re = Regex::new(r"^([^=:]+?)\s*[=:]\s*(.*)$")
        .map_err(|err| SnpError::Manifest(err.to_string()))?;

    let mut sections = Sections::new();
    let mut current: Option<String> = None;
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(caps) = section_re.captures(line) {
            let name = caps[1].to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let caps = entry_re.captures(line).ok_or_else(|| {
            SnpError::Manifest(format!("line {}: expected `key = value`", idx + 1))
        })?;
        let section = current.as_ref().ok_or_else(|| {
            SnpError::Manifest(format!("line {}: entry outside of a section", idx + 1))
        })?;
        // Keys are case-insensitive, as in classic INI readers.
        sections
            .entry(section.clone())
            .or_default()
            .insert(caps[1].to_lowercase(), caps[2].to_string());
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SAMPLE: &str = "\
[package_infos]
description = SNPs for subject 10012
maintainer: sequencing core

[set_infos]
species = ignored
specie = Human
name = ARN_Subj10012
type = Casava
source = GRCh37.75

; files
[snps]
filename = snps.txt
";

    #[test]
    fn parse_sample_manifest() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.set_name, "ARN_Subj10012");
        assert_eq!(manifest.set_type, "Casava");
        assert_eq!(manifest.species, "Human");
        assert_eq!(manifest.genome_source, "GRCh37.75");
        assert_eq!(manifest.snps_filename, "snps.txt");
        assert_eq!(
            manifest.package_infos.get("maintainer").map(String::as_str),
            Some("sequencing core")
        );
    }

    #[test]
    fn missing_key_is_reported() {
        let err = Manifest::parse("[set_infos]\nname = x\n").unwrap_err();
        assert_matches!(err, SnpError::Manifest(msg) if msg.contains("type"));
    }

    #[test]
    fn entry_before_section_is_rejected() {
        let err = Manifest::parse("name = x\n").unwrap_err();
        assert_matches!(err, SnpError::Manifest(_));
    }
}

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::SnpError;
use crate::manifest::MANIFEST_FILE;

/// An extracted SNP package. Temporary extraction directories are removed
/// when the value is dropped, whether or not the import succeeded.
#[derive(Debug)]
pub struct Package {
    root: PathBuf,
    _extracted: Option<TempDir>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Directory,
    TarGz,
    Tar,
    Zip,
}

impl Package {
    pub fn open(path: &Path, work_dir: Option<&Path>) -> Result<Self, SnpError> {
        let kind = archive_kind(path)?;
        if kind == ArchiveKind::Directory {
            return Ok(Self {
                root: path.to_path_buf(),
                _extracted: None,
            });
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("snp-import-package");
        let temp_dir = match work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|err| SnpError::Filesystem(err.to_string()))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|err| SnpError::Filesystem(err.to_string()))?;

        match kind {
            ArchiveKind::TarGz => extract_tar(MultiGzDecoder::new(open_file(path)?), temp_dir.path())?,
            ArchiveKind::Tar => extract_tar(open_file(path)?, temp_dir.path())?,
            ArchiveKind::Zip => extract_zip(path, temp_dir.path())?,
            ArchiveKind::Directory => {}
        }

        let root = locate_root(temp_dir.path())?;
        tracing::debug!(package = %path.display(), root = %root.display(), "package extracted");
        Ok(Self {
            root,
            _extracted: Some(temp_dir),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve_file(&self, name: &str) -> Result<PathBuf, SnpError> {
        let relative = Path::new(name.trim());
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes || relative.as_os_str().is_empty() {
            return Err(SnpError::Manifest(format!(
                "snps filename must be a path inside the package: {name}"
            )));
        }
        let path = self.root.join(relative);
        if !path.is_file() {
            return Err(SnpError::Manifest(format!(
                "snps file {name} not found in package"
            )));
        }
        Ok(path)
    }
}

fn archive_kind(path: &Path) -> Result<ArchiveKind, SnpError> {
    if path.is_dir() {
        return Ok(ArchiveKind::Directory);
    }
    if !path.is_file() {
        return Err(SnpError::Archive(format!(
            "package not found: {}",
            path.display()
        )));
    }
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".tar") {
        Ok(ArchiveKind::Tar)
    } else if name.ends_with(".zip") {
        Ok(ArchiveKind::Zip)
    } else {
        Err(SnpError::Archive(format!(
            "unsupported package type: {}",
            path.display()
        )))
    }
}

fn open_file(path: &Path) -> Result<fs::File, SnpError> {
    fs::File::open(path)
        .map_err(|err| SnpError::Archive(format!("open {}: {err}", path.display())))
}

fn extract_tar<R: io::Read>(reader: R, target_dir: &Path) -> Result<(), SnpError> {
    let mut archive = tar::Archive::new(reader);
    archive
        .unpack(target_dir)
        .map_err(|err| SnpError::Archive(err.to_string()))
}

fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), SnpError> {
    let mut archive =
        ZipArchive::new(open_file(zip_path)?).map_err(|err| SnpError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SnpError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(SnpError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| SnpError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| SnpError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| SnpError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| SnpError::Archive(err.to_string()))?;
    }
    Ok(())
}

fn locate_root(extracted: &Path) -> Result<PathBuf, SnpError> {
    if extracted.join(MANIFEST_FILE).is_file() {
        return Ok(extracted.to_path_buf());
    }
    let entries = fs::read_dir(extracted)
        .map_err(|err| SnpError::Filesystem(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| SnpError::Filesystem(err.to_string()))?;
    if let [single] = entries.as_slice() {
        let nested = single.path();
        if nested.is_dir() && nested.join(MANIFEST_FILE).is_file() {
            return Ok(nested);
        }
    }
    Ok(extracted.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn tar_gz_is_extracted_and_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("set.tar.gz");
        write_tar_gz(
            &archive,
            &[("pkg/manifest.ini", "[set_infos]\n"), ("pkg/snps.txt", "")],
        );
        let work = temp.path().join("work");

        let package = Package::open(&archive, Some(&work)).unwrap();
        assert!(package.root().ends_with("pkg"));
        assert!(package.resolve_file("snps.txt").is_ok());
        let extracted = package.root().parent().unwrap().to_path_buf();
        assert!(extracted.exists());

        drop(package);
        assert!(!extracted.exists());
    }

    #[test]
    fn zip_is_extracted() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("set.zip");
        let mut writer = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
        writer
            .start_file("manifest.ini", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"[set_infos]\n").unwrap();
        writer.finish().unwrap();

        let package = Package::open(&archive, None).unwrap();
        assert!(package.root().join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn directory_is_used_in_place() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("snps.vcf"), "").unwrap();
        let package = Package::open(temp.path(), None).unwrap();
        assert_eq!(package.root(), temp.path());
        drop(package);
        assert!(temp.path().join("snps.vcf").exists());
    }

    #[test]
    fn resolve_rejects_escaping_paths() {
        let temp = tempfile::tempdir().unwrap();
        let package = Package::open(temp.path(), None).unwrap();
        assert_matches!(
            package.resolve_file("../etc/passwd"),
            Err(SnpError::Manifest(_))
        );
        assert_matches!(package.resolve_file("/etc/passwd"), Err(SnpError::Manifest(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("set.rar");
        fs::write(&path, b"x").unwrap();
        assert_matches!(Package::open(&path, None), Err(SnpError::Archive(_)));
    }
}

//! Deterministic zip archives.
//!
//! Identical inputs produce byte-identical archives: entries are written in
//! sorted order with a fixed 1980-01-01 timestamp, and the only per-file
//! metadata carried over is the permission mode.

use crate::cancel::CancelFlag;
use crate::digest::file_sha256_base64;
use crate::resolve::ResolvedFileSet;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

const PARTIAL_SUFFIX: &str = "partial";

const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const END_OF_CENTRAL_DIR_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const END_OF_CENTRAL_DIR_LEN: usize = 22;
const CENTRAL_HEADER_LEN: usize = 46;

/// Host tag recorded in each entry's "version made by", selected by the
/// build OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveHost {
    /// Host 3; permission bits are stored in the external attributes.
    Unix,
    /// Host 0; external attributes are zero and extraction uses the
    /// platform default permissions.
    Dos,
}

impl ArchiveHost {
    pub fn current() -> Self {
        if cfg!(windows) { Self::Dos } else { Self::Unix }
    }
}

/// A finished archive (built or user-supplied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// sha256, base64
    pub sha256: String,
    pub size: u64,
}

impl Artifact {
    /// Describe an existing file without modifying it.
    pub fn from_existing(path: &Path) -> Result<Self, ArchiveError> {
        let size = std::fs::metadata(path)
            .map_err(|e| ArchiveError::Read {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        let sha256 = file_sha256_base64(path).map_err(|e| ArchiveError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            sha256,
            size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    host: ArchiveHost,
    cancel: CancelFlag,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(CancelFlag::new())
    }
}

impl ArchiveBuilder {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            host: ArchiveHost::current(),
            cancel,
        }
    }

    pub fn with_host(mut self, host: ArchiveHost) -> Self {
        self.host = host;
        self
    }

    /// Write `files` (relative to `root`) into a zip at `output`.
    ///
    /// The archive is staged at `<output>.partial` and renamed into place
    /// once flushed, so `output` never holds a truncated archive. Any prior
    /// file at `output` is replaced.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::EmptyArchive`] if `files` is empty
    /// - [`ArchiveError::Cancelled`] if the cancel flag is raised mid-build
    /// - I/O and zip errors for the offending path
    pub fn build(
        &self,
        files: &ResolvedFileSet,
        root: &Path,
        output: &Path,
    ) -> Result<Artifact, ArchiveError> {
        if files.is_empty() {
            return Err(ArchiveError::EmptyArchive {
                output: output.to_path_buf(),
            });
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let partial = partial_path(output);
        let result = self.write_entries(files, root, &partial);
        if let Err(err) = result {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                tracing::debug!(
                    path = %partial.display(),
                    error = %cleanup,
                    "no partial archive to remove"
                );
            }
            return Err(err);
        }

        std::fs::rename(&partial, output).map_err(|e| ArchiveError::Write {
            path: output.to_path_buf(),
            source: e,
        })?;

        let artifact = Artifact::from_existing(output)?;
        tracing::debug!(
            output = %output.display(),
            entries = files.len(),
            size = artifact.size,
            "archive written"
        );
        Ok(artifact)
    }

    fn write_entries(
        &self,
        files: &ResolvedFileSet,
        root: &Path,
        partial: &Path,
    ) -> Result<(), ArchiveError> {
        let file = File::create(partial).map_err(|e| ArchiveError::Write {
            path: partial.to_path_buf(),
            source: e,
        })?;
        let mut zip = zip::ZipWriter::new(BufWriter::new(file));

        let mut seen = HashSet::new();
        for relative in files.iter() {
            if self.cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }

            let name = entry_name(relative);
            if !seen.insert(name.to_owned()) {
                tracing::warn!(
                    path = relative,
                    entry = name,
                    "skipping file whose archive entry name is already taken"
                );
                continue;
            }

            let source = root.join(relative);
            let contents = std::fs::read(&source).map_err(|e| ArchiveError::Read {
                path: source.clone(),
                source: e,
            })?;

            let options = self.entry_options(&source)?;
            zip.start_file(name, options).map_err(|e| ArchiveError::Zip {
                path: source.clone(),
                source: e,
            })?;
            zip.write_all(&contents).map_err(|e| ArchiveError::Write {
                path: partial.to_path_buf(),
                source: e,
            })?;
        }

        let mut writer = zip.finish().map_err(|e| ArchiveError::Zip {
            path: partial.to_path_buf(),
            source: e,
        })?;
        writer.flush().map_err(|e| ArchiveError::Write {
            path: partial.to_path_buf(),
            source: e,
        })?;
        drop(writer);

        if self.host == ArchiveHost::Dos {
            retag_as_dos(partial)?;
        }
        Ok(())
    }

    fn entry_options(&self, source: &Path) -> Result<SimpleFileOptions, ArchiveError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        Ok(match self.host {
            ArchiveHost::Unix => options.unix_permissions(file_mode(source)?),
            ArchiveHost::Dos => options,
        })
    }
}

/// Rewrite every central-directory header of the archive at `path` to a
/// DOS host with zeroed external attributes. The zip writer always records
/// a Unix host, so the tag is patched after the archive is finished.
fn retag_as_dos(path: &Path) -> Result<(), ArchiveError> {
    let mut bytes = std::fs::read(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    set_dos_host(&mut bytes).ok_or_else(|| ArchiveError::Layout {
        path: path.to_path_buf(),
    })?;
    std::fs::write(path, &bytes).map_err(|e| ArchiveError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `None` if the central directory cannot be located (including zip64
/// archives, whose sizes live in a separate record).
fn set_dos_host(bytes: &mut [u8]) -> Option<()> {
    let last = bytes.len().checked_sub(END_OF_CENTRAL_DIR_LEN)?;
    let eocd = (0..=last)
        .rev()
        .find(|&i| bytes[i..].starts_with(&END_OF_CENTRAL_DIR_SIGNATURE))?;

    let entries = read_u16(bytes, eocd + 10)?;
    let offset = read_u32(bytes, eocd + 16)?;
    if entries == u16::MAX || offset == u32::MAX {
        return None;
    }

    let mut pos = usize::try_from(offset).ok()?;
    for _ in 0..entries {
        if !bytes.get(pos..)?.starts_with(&CENTRAL_HEADER_SIGNATURE) {
            return None;
        }
        let name_len = usize::from(read_u16(bytes, pos + 28)?);
        let extra_len = usize::from(read_u16(bytes, pos + 30)?);
        let comment_len = usize::from(read_u16(bytes, pos + 32)?);

        // High byte of "version made by" is the host system.
        *bytes.get_mut(pos + 5)? = 0;
        bytes.get_mut(pos + 38..pos + 42)?.fill(0);

        pos += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
    }
    Some(())
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Entry name for a resolved path: leading `../` segments are dropped so
/// files pulled in from outside the root land at the archive top level.
pub fn entry_name(relative: &str) -> &str {
    let mut name = relative;
    while let Some(rest) = name.strip_prefix("../") {
        name = rest;
    }
    name
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32, ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(path: &Path) -> Result<u32, ArchiveError> {
    let metadata = std::fs::metadata(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("refusing to write empty archive {output}")]
    EmptyArchive { output: PathBuf },

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to add {path} to archive")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("unexpected zip layout in {path}; cannot set host tag")]
    Layout { path: PathBuf },

    #[error("packaging cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyArchive { .. } => "EMPTY_ARCHIVE",
            Self::Read { .. } | Self::Write { .. } | Self::Zip { .. } | Self::Layout { .. } => {
                "ARCHIVE_IO"
            }
            Self::Cancelled => "PACKAGING_CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_name_strips_parent_segments() {
        assert_eq!(entry_name("../shared/x.js"), "shared/x.js");
        assert_eq!(entry_name("../../a/b.js"), "a/b.js");
        assert_eq!(entry_name("lib/b.js"), "lib/b.js");
    }

    #[test]
    fn truncated_archive_has_no_central_directory() {
        let mut bytes = vec![0u8; 10];
        assert!(set_dos_host(&mut bytes).is_none());

        let mut bytes = END_OF_CENTRAL_DIR_SIGNATURE.to_vec();
        bytes.resize(END_OF_CENTRAL_DIR_LEN, 0);
        bytes[10] = 1;
        assert!(set_dos_host(&mut bytes).is_none());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/svc.zip")),
            PathBuf::from("/out/svc.zip.partial")
        );
    }

    #[test]
    fn empty_file_set_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArchiveBuilder::default()
            .build(
                &ResolvedFileSet::default(),
                tmp.path(),
                &tmp.path().join("out.zip"),
            )
            .unwrap_err();
        assert_eq!(err.code(), "EMPTY_ARCHIVE");
        assert!(!tmp.path().join("out.zip").exists());
    }

    #[test]
    fn cancelled_build_leaves_no_output() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.js"), "a").unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let output = tmp.path().join("out.zip");
        let err = ArchiveBuilder::new(cancel)
            .build(&ResolvedFileSet::from_paths(["a.js"]), tmp.path(), &output)
            .unwrap_err();

        assert_eq!(err.code(), "PACKAGING_CANCELLED");
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }
}

//! Replacer module for the post-encode file swap.
//!
//! After an encode exactly one of {source, derived output} is deleted:
//! the source when the encoder succeeded, the output otherwise. The derived
//! output lives next to the source under a suffixed name, so both files
//! coexist only while the encoder runs or after a failed delete.

use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during file replacement.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// Encoder reported success but left no output file.
    #[error("Encoded output {0} is missing")]
    OutputMissing(PathBuf),

    /// Encoder reported success but the output file is empty.
    #[error("Encoded output {0} is empty")]
    OutputEmpty(PathBuf),

    /// Failed to delete the original after a successful encode.
    #[error("Failed to delete source {path}: {source}")]
    RemoveSourceFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to delete the derived output.
    #[error("Failed to delete output {path}: {source}")]
    RemoveOutputFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which file the replacement step removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceAction {
    /// Source deleted; the derived output is now the canonical file.
    SourceReplaced,
    /// Derived output deleted (or never written); source untouched.
    OutputDiscarded,
}

/// Derives the output path for a source file.
///
/// Same directory and extension, with `suffix` appended to the file stem:
/// `/media/film.mkv` + `-tox264` -> `/media/film-tox264.mkv`.
///
/// Returns None when the source has no file name or when the result would
/// be the source itself.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use hevc_sweep::replace::derived_path;
///
/// let derived = derived_path(Path::new("/media/movies/film.mkv"), "-tox264");
/// assert_eq!(derived, Some(PathBuf::from("/media/movies/film-tox264.mkv")));
/// ```
pub fn derived_path(source: &Path, suffix: &str) -> Option<PathBuf> {
    let stem = source.file_stem()?;

    let mut name = stem.to_os_string();
    name.push(suffix);
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }

    let derived = source.with_file_name(name);
    if derived == source {
        None
    } else {
        Some(derived)
    }
}

/// Removes a derived output left behind by an earlier run.
///
/// Returns true if a file was removed.
pub fn remove_stale_output(derived: &Path) -> Result<bool, ReplaceError> {
    match fs::remove_file(derived) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ReplaceError::RemoveOutputFailed {
            path: derived.to_path_buf(),
            source,
        }),
    }
}

/// Keeps the encoded output and deletes the source.
///
/// The output must exist and be non-empty first; otherwise the source is
/// kept and an empty output is removed.
pub fn commit_output(source: &Path, derived: &Path) -> Result<ReplaceAction, ReplaceError> {
    let metadata = match fs::metadata(derived) {
        Ok(m) => m,
        Err(_) => return Err(ReplaceError::OutputMissing(derived.to_path_buf())),
    };

    if metadata.len() == 0 {
        remove_stale_output(derived)?;
        return Err(ReplaceError::OutputEmpty(derived.to_path_buf()));
    }

    match fs::remove_file(source) {
        Ok(()) => Ok(ReplaceAction::SourceReplaced),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                "Source {} vanished during encode; keeping {}",
                source.display(),
                derived.display()
            );
            Ok(ReplaceAction::SourceReplaced)
        }
        Err(e) => Err(ReplaceError::RemoveSourceFailed {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

/// Deletes the (incomplete or corrupt) output, leaving the source untouched.
///
/// A missing output is fine: the encoder may fail before creating it.
pub fn discard_output(derived: &Path) -> Result<ReplaceAction, ReplaceError> {
    remove_stale_output(derived)?;
    Ok(ReplaceAction::OutputDiscarded)
}

/// Applies the replacement protocol for an encoder outcome.
pub fn finish_replacement(
    source: &Path,
    derived: &Path,
    encode_succeeded: bool,
) -> Result<ReplaceAction, ReplaceError> {
    if encode_succeeded {
        commit_output(source, derived)
    } else {
        discard_output(derived)
    }
}

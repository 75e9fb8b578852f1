use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::script::{CopyInstruction, DecodeScript};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("failed to write script {}: {source}", path.display())]
    WriteScript { path: PathBuf, source: io::Error },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    pub copied: usize,
    pub skipped: usize,
}

/// Copies each backing file into the staging tree.
///
/// A destination that already exists is left alone.
pub fn stage_objects(copies: &[CopyInstruction]) -> Result<StageSummary, StageError> {
    let mut summary = StageSummary::default();

    for copy in copies {
        if copy.destination.exists() {
            debug!(dest = %copy.destination.display(), "already staged");
            summary.skipped += 1;
            continue;
        }

        if let Some(parent) = copy.destination.parent() {
            fs::create_dir_all(parent).map_err(|source| StageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::copy(&copy.source, &copy.destination).map_err(|source| StageError::Copy {
            from: copy.source.clone(),
            to: copy.destination.clone(),
            source,
        })?;
        debug!(src = %copy.source.display(), dest = %copy.destination.display(), "staged");
        summary.copied += 1;
    }

    info!(copied = summary.copied, skipped = summary.skipped, "staging done");
    Ok(summary)
}

pub fn write_script(path: &Path, script: &DecodeScript) -> Result<(), StageError> {
    let wrap = |source| StageError::WriteScript {
        path: path.to_path_buf(),
        source,
    };

    fs::write(path, script.render()).map_err(wrap)?;
    make_executable(path).map_err(wrap)?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

//! # Backup Archives
//!
//! ```text
//! backup_dir/
//! └── backup_20240101_120000.tar.gz
//!     ├── etc/boxvps/data/users.json     entries relative to "/"
//!     ├── etc/boxvps/data/usage.json
//!     ├── usr/local/etc/xray/config.json
//!     └── ...
//! ```
//!
//! Archives are built in a blocking task and written to a dot-prefixed
//! temp file that is renamed into place once the gzip stream is finished.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// `backup_YYYYmmdd_HHMMSS.tar.gz`
pub fn archive_name(now: DateTime<Utc>) -> String {
    format!("backup_{}.tar.gz", now.format("%Y%m%d_%H%M%S"))
}

/// Drops sources contained in another source so nothing is archived twice.
fn outermost(mut sources: Vec<PathBuf>) -> Vec<PathBuf> {
    sources.sort();
    sources.dedup();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for source in sources {
        if !kept.iter().any(|k| source.starts_with(k)) {
            kept.push(source);
        }
    }
    kept
}

/// Archives every existing source into `backup_dir`. Returns the archive path.
pub async fn create_archive(
    backup_dir: &Path,
    sources: Vec<PathBuf>,
    now: DateTime<Utc>,
) -> EngineResult<PathBuf> {
    tokio::fs::create_dir_all(backup_dir).await.map_err(|e| {
        EngineError::Backup(format!("cannot create {}: {}", backup_dir.display(), e))
    })?;

    let name = archive_name(now);
    let target = backup_dir.join(&name);
    let temp = backup_dir.join(format!(".{}.tmp", name));

    let temp_for_task = temp.clone();
    let written = tokio::task::spawn_blocking(move || write_tar_gz(&temp_for_task, outermost(sources)))
        .await
        .map_err(|e| EngineError::Backup(format!("archive task failed: {}", e)))?;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }

    tokio::fs::rename(&temp, &target).await.map_err(|e| {
        EngineError::Backup(format!("cannot rename into {}: {}", target.display(), e))
    })?;

    info!(archive = %target.display(), "Backup archive created");
    Ok(target)
}

fn write_tar_gz(path: &Path, sources: Vec<PathBuf>) -> EngineResult<()> {
    let backup_err = |e: std::io::Error| EngineError::Backup(format!("{}: {}", path.display(), e));

    let file = File::create(path).map_err(backup_err)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for source in sources {
        if !source.exists() {
            warn!(path = %source.display(), "Backup source missing, skipping");
            continue;
        }
        let name = source.strip_prefix("/").unwrap_or(&source);
        let added = if source.is_dir() {
            builder.append_dir_all(name, &source)
        } else {
            builder.append_path_with_name(&source, name)
        };
        added.map_err(|e| EngineError::Backup(format!("{}: {}", source.display(), e)))?;
        debug!(path = %source.display(), "Added to backup");
    }

    let encoder = builder.into_inner().map_err(backup_err)?;
    let file = encoder.finish().map_err(backup_err)?;
    file.sync_all().map_err(backup_err)
}

/// Unpacks an archive under `root`, overwriting existing files.
pub async fn extract_archive(archive: &Path, root: &Path) -> EngineResult<()> {
    if !archive.is_file() {
        return Err(EngineError::Backup(format!(
            "archive not found: {}",
            archive.display()
        )));
    }

    let archive = archive.to_path_buf();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || -> EngineResult<()> {
        let restore_err = |e: std::io::Error| EngineError::Restore(format!("{}: {}", archive.display(), e));

        std::fs::create_dir_all(&root).map_err(restore_err)?;
        let file = File::open(&archive).map_err(restore_err)?;
        let mut tar = Archive::new(GzDecoder::new(file));
        tar.set_preserve_permissions(true);
        tar.set_overwrite(true);
        tar.unpack(&root).map_err(restore_err)?;

        info!(archive = %archive.display(), root = %root.display(), "Backup archive extracted");
        Ok(())
    })
    .await
    .map_err(|e| EngineError::Restore(format!("extract task failed: {}", e)))?
}

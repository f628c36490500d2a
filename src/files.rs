//! Proof file naming and creation
//!
//! A proof for `name` lives next to it as `name.ots`; upgrades keep the
//! previous proof as `name.ots.bak`.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{OtsError, OtsResult};

pub const PROOF_EXTENSION: &str = "ots";
pub const BACKUP_EXTENSION: &str = "bak";

fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// `file` -> `file.ots`
pub fn ots_path(file: &Path) -> PathBuf {
    with_suffix(file, PROOF_EXTENSION)
}

/// `file.ots` -> `file.ots.bak`
pub fn backup_path(proof: &Path) -> PathBuf {
    with_suffix(proof, BACKUP_EXTENSION)
}

/// `file.ots` -> `file`; `None` when the path has no `.ots` suffix
pub fn original_path(proof: &Path) -> Option<PathBuf> {
    if proof.extension()? != std::ffi::OsStr::new(PROOF_EXTENSION) {
        return None;
    }
    let stem = proof.file_stem()?;
    Some(proof.with_file_name(stem))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A proof was already there and has not been touched
    AlreadyExists,
}

/// Hidden sibling of `path` unique to this process and call
pub(crate) fn temp_path(path: &Path) -> OtsResult<PathBuf> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let name = path
        .file_name()
        .ok_or_else(|| OtsError::Config(format!("not a file path: {}", path.display())))?;
    let mut tmp = OsString::from(".");
    tmp.push(name);
    tmp.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    Ok(path.with_file_name(tmp))
}

/// Write everything and flush; a buffered error surfaces here
pub(crate) async fn write_flushed<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Create or truncate `path`, write `bytes` and fsync
pub(crate) async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    write_flushed(&mut file, bytes).await?;
    file.sync_all().await
}

async fn write_new_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    write_flushed(&mut file, bytes).await?;
    file.sync_all().await
}

/// Write a new proof file, never replacing an existing one
///
/// The proof is written and synced under a temporary name, then linked into
/// place, so `path` either does not exist or holds the complete proof.
pub async fn create_proof(path: &Path, bytes: &[u8]) -> OtsResult<CreateOutcome> {
    let tmp = temp_path(path)?;
    let result = link_new(&tmp, path, bytes).await;
    if let Err(e) = tokio::fs::remove_file(&tmp).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temporary proof");
        }
    }
    result
}

async fn link_new(tmp: &Path, path: &Path, bytes: &[u8]) -> OtsResult<CreateOutcome> {
    write_new_synced(tmp, bytes).await?;
    match tokio::fs::hard_link(tmp, path).await {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

//! Rewriting proof files on disk
//!
//! The previous proof is saved to `<file>.bak` and flushed before the proof
//! itself is replaced through a temporary file and a rename, so a crash at
//! any point leaves at least one complete copy. Writers to the same path are
//! serialized within the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use super::{UpgradeManager, UpgradeOutcome};
use crate::error::{OtsError, OtsResult};
use crate::files::{backup_path, temp_path, write_synced};
use crate::ots::DetachedTimestampFile;

type PathLock = Arc<tokio::sync::Mutex<()>>;
type PathLocks = Mutex<HashMap<PathBuf, PathLock>>;

fn locks() -> &'static PathLocks {
    static LOCKS: OnceLock<PathLocks> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

fn lock_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn path_lock(key: &Path) -> OtsResult<PathLock> {
    let mut locks = locks()
        .lock()
        .map_err(|_| OtsError::Internal("proof lock table poisoned".into()))?;
    Ok(Arc::clone(locks.entry(key.to_path_buf()).or_default()))
}

/// Drop the table entry once no other caller holds or waits on it
fn release_path_lock(key: &Path, lock: PathLock) {
    let Ok(mut locks) = locks().lock() else {
        return;
    };
    // one reference in the table, one here
    if Arc::strong_count(&lock) == 2 {
        locks.remove(key);
    }
}

/// Upgrade the proof stored at `path`
///
/// Unchanged proofs leave the filesystem untouched.
pub async fn upgrade_file(manager: &UpgradeManager, path: &Path) -> OtsResult<UpgradeOutcome> {
    let key = lock_key(path);
    let lock = path_lock(&key)?;
    let result = {
        let _guard = lock.lock().await;
        upgrade_locked(manager, path).await
    };
    release_path_lock(&key, lock);
    result
}

async fn upgrade_locked(manager: &UpgradeManager, path: &Path) -> OtsResult<UpgradeOutcome> {
    let original = tokio::fs::read(path).await?;
    let proof = DetachedTimestampFile::from_bytes(&original)?;
    let outcome = manager.upgrade(&proof).await?;

    if outcome.changed {
        let backup = backup_path(path);
        write_synced(&backup, &original).await?;
        tracing::debug!(path = %backup.display(), "Previous proof backed up");

        replace(path, &outcome.proof.to_bytes()?).await?;
        tracing::info!(path = %path.display(), "Proof upgraded");
    }

    Ok(outcome)
}

async fn replace(path: &Path, bytes: &[u8]) -> OtsResult<()> {
    let tmp = temp_path(path)?;
    if let Err(e) = write_synced(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::mock::{pending_fragment, MockCalendar, UpgradeBehavior};
    use crate::calendar::CalendarWhitelist;
    use crate::ots::{Op, Timestamp};
    use std::time::Duration;
    use tempfile::TempDir;

    const A: &str = "https://a.calendar.opentimestamps.org";

    fn proof_bytes() -> Vec<u8> {
        let digest = Op::Sha256.execute(b"on disk");
        let mut ts = Timestamp::new(digest.clone());
        ts.merge(pending_fragment(A, &digest).unwrap()).unwrap();
        DetachedTimestampFile::new(Op::Sha256, ts)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    fn manager(mock: Arc<MockCalendar>) -> UpgradeManager {
        UpgradeManager::new(mock, CalendarWhitelist::default(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_unchanged_proof_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt.ots");
        let bytes = proof_bytes();
        std::fs::write(&path, &bytes).unwrap();

        let outcome = upgrade_file(&manager(Arc::new(MockCalendar::new())), &path)
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_changed_proof_is_backed_up_then_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt.ots");
        let bytes = proof_bytes();
        std::fs::write(&path, &bytes).unwrap();

        let mock = Arc::new(MockCalendar::new());
        mock.set_upgrade(A, UpgradeBehavior::Settle { height: 42 });
        let outcome = upgrade_file(&manager(mock), &path).await.unwrap();

        assert!(outcome.changed);
        assert_eq!(std::fs::read(backup_path(&path)).unwrap(), bytes);
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, outcome.proof.to_bytes().unwrap());
        assert!(DetachedTimestampFile::from_bytes(&written)
            .unwrap()
            .timestamp
            .is_settled());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_proof_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ots");
        std::fs::write(&path, b"not a proof").unwrap();

        let err = upgrade_file(&manager(Arc::new(MockCalendar::new())), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, OtsError::InvalidProof(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"not a proof");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = upgrade_file(
            &manager(Arc::new(MockCalendar::new())),
            &dir.path().join("absent.ots"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OtsError::Io(_)));
    }

    #[tokio::test]
    async fn test_concurrent_upgrades_of_same_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.ots");
        std::fs::write(&path, proof_bytes()).unwrap();

        let mock = Arc::new(MockCalendar::new());
        mock.set_upgrade(A, UpgradeBehavior::Settle { height: 3 });
        let manager = manager(mock);

        let (first, second) = tokio::join!(
            upgrade_file(&manager, &path),
            upgrade_file(&manager, &path)
        );
        let changed = [first.unwrap().changed, second.unwrap().changed];

        // the second writer sees the first one's result
        assert_eq!(changed.iter().filter(|c| **c).count(), 1);
        assert!(DetachedTimestampFile::from_bytes(&std::fs::read(&path).unwrap())
            .unwrap()
            .timestamp
            .is_settled());
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_failed_backup_keeps_proof() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt.ots");
        let bytes = proof_bytes();
        std::fs::write(&path, &bytes).unwrap();
        std::fs::create_dir(backup_path(&path)).unwrap();

        let mock = Arc::new(MockCalendar::new());
        mock.set_upgrade(A, UpgradeBehavior::Settle { height: 42 });
        let err = upgrade_file(&manager(mock), &path).await.unwrap_err();

        assert!(matches!(err, OtsError::Io(_)));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert_eq!(file_names(dir.path()), vec!["doc.txt.ots", "doc.txt.ots.bak"]);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_proof_and_backup() {
        let dir = TempDir::new().unwrap();
        // the backup name fits the filesystem limit, the temporary name does not
        let name = format!("{}.ots", "d".repeat(246));
        let path = dir.path().join(&name);
        let bytes = proof_bytes();
        std::fs::write(&path, &bytes).unwrap();

        let mock = Arc::new(MockCalendar::new());
        mock.set_upgrade(A, UpgradeBehavior::Settle { height: 42 });
        let err = upgrade_file(&manager(mock), &path).await.unwrap_err();

        assert!(matches!(err, OtsError::Io(_)));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert_eq!(std::fs::read(backup_path(&path)).unwrap(), bytes);
        assert_eq!(file_names(dir.path()), vec![name.clone(), format!("{name}.bak")]);
    }

    #[tokio::test]
    async fn test_lock_entry_released_after_upgrade() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("released.ots");
        std::fs::write(&path, proof_bytes()).unwrap();

        upgrade_file(&manager(Arc::new(MockCalendar::new())), &path)
            .await
            .unwrap();
        assert!(!locks().lock().unwrap().contains_key(&lock_key(&path)));

        // failures release too
        let missing = dir.path().join("missing.ots");
        assert!(upgrade_file(&manager(Arc::new(MockCalendar::new())), &missing)
            .await
            .is_err());
        assert!(!locks().lock().unwrap().contains_key(&lock_key(&missing)));
    }
}

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owns the `<download_dir>/<uuid>/` job directory of a single download.
#[derive(Debug)]
pub struct TempDownload {
    dir: PathBuf,
    id: Uuid,
}

impl TempDownload {
    pub async fn create(download_dir: &Path) -> io::Result<Self> {
        let id = Uuid::new_v4();
        let dir = download_dir.join(id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, id })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output_template(&self) -> String {
        self.dir
            .join(format!("{}.%(ext)s", self.id))
            .to_string_lossy()
            .into_owned()
    }

    pub fn owns(&self, file_name: &str) -> bool {
        file_name.starts_with(&format!("{}.", self.id))
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("cleaned up temporary download {}", self.id),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => debug!("could not clean up {:?}: {error}", self.dir),
        }
    }
}

/// Removes anything in `download_dir` older than `max_age`.
pub async fn sweep_stale_downloads(download_dir: &Path, max_age: Duration) {
    let mut entries = match tokio::fs::read_dir(download_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("could not open download dir for cleanup: {error}");
            }
            return;
        }
    };

    let now = std::time::SystemTime::now();
    let mut removed = 0usize;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("could not iterate download dir for cleanup: {error}");
                break;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("could not read metadata of {:?}: {error}", path);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified_at| now.duration_since(modified_at).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("could not remove stale download {:?}: {error}", path),
        }
    }

    if removed > 0 {
        warn!("removed {removed} orphaned download(s) from {:?}", download_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn template_lives_in_a_job_dir_named_by_id() {
        let root = tempfile::tempdir().unwrap();
        let guard = TempDownload::create(root.path()).await.unwrap();
        let id = guard.id().to_string();

        assert_eq!(guard.dir(), root.path().join(&id));
        assert!(guard.dir().is_dir());
        let expected = root
            .path()
            .join(&id)
            .join(format!("{id}.%(ext)s"))
            .to_string_lossy()
            .into_owned();
        assert_eq!(guard.output_template(), expected);
        assert!(guard.owns(&format!("{id}.mp4")));
        assert!(!guard.owns("other.mp4"));
    }

    #[tokio::test]
    async fn ids_are_unique_per_guard() {
        let root = tempfile::tempdir().unwrap();
        let first = TempDownload::create(root.path()).await.unwrap();
        let second = TempDownload::create(root.path()).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.dir(), second.dir());
    }

    #[tokio::test]
    async fn drop_removes_the_job_dir_only() {
        let root = tempfile::tempdir().unwrap();
        let neighbour = root.path().join("someone-else.mp4");
        std::fs::write(&neighbour, b"data").unwrap();

        let guard = TempDownload::create(root.path()).await.unwrap();
        let job_dir = guard.dir().to_path_buf();
        let output = job_dir.join(format!("{}.mp3", guard.id()));
        let intermediate = job_dir.join(format!("{}.webm.part", guard.id()));
        for path in [&output, &intermediate] {
            std::fs::write(path, b"data").unwrap();
        }

        drop(guard);

        assert!(!job_dir.exists());
        assert!(neighbour.exists());
    }

    #[tokio::test]
    async fn drop_tolerates_an_already_removed_dir() {
        let root = tempfile::tempdir().unwrap();
        let guard = TempDownload::create(root.path()).await.unwrap();
        std::fs::remove_dir_all(guard.dir()).unwrap();
        drop(guard);
    }

    #[tokio::test]
    async fn create_fails_when_the_root_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"data").unwrap();
        assert!(TempDownload::create(&file).await.is_err());
    }

    #[tokio::test]
    async fn sweep_respects_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orphan.mp4");
        let job_dir = dir.path().join("orphan-job");
        std::fs::write(&file, b"data").unwrap();
        std::fs::create_dir(&job_dir).unwrap();

        sweep_stale_downloads(dir.path(), Duration::from_secs(3600)).await;
        assert!(file.exists());
        assert!(job_dir.exists());

        sweep_stale_downloads(dir.path(), Duration::ZERO).await;
        assert!(!file.exists());
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn sweep_ignores_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        sweep_stale_downloads(&dir.path().join("missing"), Duration::ZERO).await;
    }
}

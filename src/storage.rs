use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Временная папка для PNG, которые отдаются через /download
#[derive(Debug, Clone)]
pub struct TempStorage {
    dir: PathBuf,
    max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct TempFile {
    pub path: PathBuf,
    /// Имя, под которым файл скачивает пользователь
    pub download_name: String,
}

impl TempStorage {
    pub async fn new(dir: impl Into<PathBuf>, max_age: Duration) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            anyhow::anyhow!("Failed to create temp directory {}: {}", dir.display(), e)
        })?;

        Ok(Self { dir, max_age })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Сохранить PNG во временный файл
    pub async fn write_png(&self, bytes: &[u8]) -> anyhow::Result<TempFile> {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        // Одинаковые миллисекунды у параллельных запросов разводит суффикс
        let path = self
            .dir
            .join(format!("qr-code-{}-{}.png", millis, &suffix[..8]));

        tokio::fs::write(&path, bytes).await?;
        log::debug!("Temp file {} written ({} bytes)", path.display(), bytes.len());

        Ok(TempFile {
            path,
            download_name: format!("qr-code-{}.png", millis),
        })
    }

    /// Прочитать файл и сразу удалить его
    pub async fn take(&self, file: &TempFile) -> anyhow::Result<Vec<u8>> {
        let read = tokio::fs::read(&file.path).await;

        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            log::error!("Error deleting temp file {}: {}", file.path.display(), e);
        }

        Ok(read?)
    }

    /// Удалить файлы старше `max_age`
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        self.sweep_at(SystemTime::now()).await
    }

    pub async fn sweep_at(&self, now: SystemTime) -> anyhow::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut deleted = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Файл мог исчезнуть между read_dir и stat
                Err(e) => {
                    log::debug!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            if self.is_expired(&entry.path(), metadata.modified(), now) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => deleted += 1,
                    Err(e) => log::warn!("Failed to delete {}: {}", entry.path().display(), e),
                }
            }
        }

        if deleted > 0 {
            log::info!("Cleaned up {} temporary files", deleted);
        }

        Ok(deleted)
    }

    /// Без mtime файл не трогаем, как и при ошибке stat
    fn is_expired(&self, path: &Path, modified: std::io::Result<SystemTime>, now: SystemTime) -> bool {
        match modified {
            Ok(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO) > self.max_age,
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Фоновая периодическая очистка временной папки
pub fn spawn_sweeper(storage: TempStorage, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = storage.sweep().await {
                log::error!("Error cleaning up temp files: {}", e);
            }
        }
    })
}

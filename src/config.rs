use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::qr::EcLevelName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub qr: QrConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    pub default_size: u32,
    pub default_margin: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub max_margin: u32,
    pub ec_level: EcLevelName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub temp_dir: PathBuf,
    /// Файлы старше этого возраста удаляются при очистке
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            default_size: 300,
            default_margin: 4,
            min_size: 50,
            max_size: 2000,
            max_margin: 20,
            ec_level: EcLevelName::M,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            max_age_secs: 3600,
            sweep_interval_secs: 600,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Загружаем из переменных окружения или используем дефолты
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собрать конфиг из произвольного источника ключей (env в проде, map в тестах)
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let qr_defaults = QrConfig::default();
        let storage_defaults = StorageConfig::default();

        let config = Config {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(&lookup, "PORT", 3000),
            },
            qr: QrConfig {
                default_size: parse_or(&lookup, "QR_DEFAULT_SIZE", qr_defaults.default_size),
                default_margin: parse_or(&lookup, "QR_DEFAULT_MARGIN", qr_defaults.default_margin),
                min_size: parse_or(&lookup, "QR_MIN_SIZE", qr_defaults.min_size),
                max_size: parse_or(&lookup, "QR_MAX_SIZE", qr_defaults.max_size),
                max_margin: parse_or(&lookup, "QR_MAX_MARGIN", qr_defaults.max_margin),
                ec_level: parse_or(&lookup, "QR_EC_LEVEL", qr_defaults.ec_level),
            },
            storage: StorageConfig {
                temp_dir: lookup("QR_TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(storage_defaults.temp_dir),
                max_age_secs: parse_or(&lookup, "QR_TEMP_MAX_AGE_SECS", storage_defaults.max_age_secs),
                sweep_interval_secs: parse_or(
                    &lookup,
                    "QR_SWEEP_INTERVAL_SECS",
                    storage_defaults.sweep_interval_secs,
                ),
            },
        };

        // Валидация конфигурации
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let qr = &self.qr;

        if qr.min_size == 0 {
            anyhow::bail!("QR_MIN_SIZE must be positive");
        }

        if qr.min_size > qr.max_size {
            anyhow::bail!(
                "QR_MIN_SIZE ({}) is greater than QR_MAX_SIZE ({})",
                qr.min_size,
                qr.max_size
            );
        }

        if qr.default_size < qr.min_size || qr.default_size > qr.max_size {
            anyhow::bail!(
                "QR_DEFAULT_SIZE ({}) must be within {}..={}",
                qr.default_size,
                qr.min_size,
                qr.max_size
            );
        }

        if qr.default_margin > qr.max_margin {
            anyhow::bail!(
                "QR_DEFAULT_MARGIN ({}) exceeds QR_MAX_MARGIN ({})",
                qr.default_margin,
                qr.max_margin
            );
        }

        if self.storage.max_age_secs == 0 {
            anyhow::bail!("QR_TEMP_MAX_AGE_SECS must be positive");
        }

        if self.storage.sweep_interval_secs == 0 {
            anyhow::bail!("QR_SWEEP_INTERVAL_SECS must be positive");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.storage.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.storage.sweep_interval_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid value {:?} for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

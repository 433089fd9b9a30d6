use crate::summary::merge::merge_configurations;
use crate::summary::model::{Configuration, Environment};
use log::info;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CONFIG_EXTENSION: &str = "json";

#[derive(thiserror::Error, Debug)]
pub enum ConfigStoreError {
    #[error("stored configuration {path} is unreadable: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },
    #[error("configuration already exists at {0}; run with merge or overwrite")]
    DuplicateConfiguration(PathBuf),
    #[error("invalid db_table name: {0:?}")]
    InvalidTable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 已存在同 (environment, db_table) 配置时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    #[default]
    Reject,
    Merge,
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub config: Configuration,
    pub merged: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    archive_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn path_for(
        &self,
        environment: Environment,
        table: &str,
    ) -> Result<PathBuf, ConfigStoreError> {
        let table = table.trim();
        if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
            return Err(ConfigStoreError::InvalidTable(table.to_string()));
        }
        Ok(self.archive_dir.join(format!(
            "{}_{}_config.{}",
            environment, table, CONFIG_EXTENSION
        )))
    }

    /// 反序列化失败或读失败都视为 StoreCorrupt
    pub fn load(path: &Path) -> Result<Configuration, ConfigStoreError> {
        let corrupt = |reason: String| ConfigStoreError::StoreCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let raw = fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| corrupt(e.to_string()))
    }

    pub fn exists(
        &self,
        environment: Environment,
        table: &str,
    ) -> Result<Option<Configuration>, ConfigStoreError> {
        let path = self.path_for(environment, table)?;
        match fs::metadata(&path) {
            Ok(_) => Self::load(&path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigStoreError::StoreCorrupt {
                path,
                reason: e.to_string(),
            }),
        }
    }

    /// 直接覆盖写入（last-write-wins）。先写临时文件再 rename，watcher 不会读到半个文件
    pub fn save(&self, config: &Configuration) -> Result<PathBuf, ConfigStoreError> {
        let path = self.path_for(config.environment, &config.db_table)?;
        fs::create_dir_all(&self.archive_dir)?;

        let body = serde_json::to_vec_pretty(config).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;

        let abs = fs::canonicalize(&path).unwrap_or(path);
        info!("configuration saved to {}", abs.display());
        Ok(abs)
    }

    /// 带冲突检查的保存
    pub fn save_with_policy(
        &self,
        config: &Configuration,
        policy: SavePolicy,
    ) -> Result<SaveOutcome, ConfigStoreError> {
        let existing = self.exists(config.environment, &config.db_table)?;
        let (to_write, merged) = match (existing, policy) {
            (None, _) | (Some(_), SavePolicy::Overwrite) => (config.clone(), false),
            (Some(_), SavePolicy::Reject) => {
                return Err(ConfigStoreError::DuplicateConfiguration(
                    self.path_for(config.environment, &config.db_table)?,
                ))
            }
            (Some(old), SavePolicy::Merge) => (merge_configurations(&old, config), true),
        };

        let path = self.save(&to_write)?;
        Ok(SaveOutcome {
            path,
            config: to_write,
            merged,
        })
    }
}

use crate::dispatch::runner::{AnyRunner, RunnerError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://job_status.db?mode=rwc";
pub const DEFAULT_ARCHIVE_DIR: &str = "archived_summarizers";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// 进程级配置，全部来自环境变量（.env 已在启动时加载）
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub archive_dir: PathBuf,
    pub watch_dir: PathBuf,
    pub runner_kind: String,
    pub runner_command: Option<String>,
    pub runner_url: Option<String>,
    pub runner_timeout: Duration,
    pub poll_interval: Duration,
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, SettingsError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or(SettingsError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let archive_dir = PathBuf::from(
            non_empty("SUMMARIZER_CONFIG_ARCHIVE").unwrap_or_else(|| DEFAULT_ARCHIVE_DIR.into()),
        );
        let watch_dir = non_empty("WATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| archive_dir.clone());

        Ok(Self {
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            archive_dir,
            watch_dir,
            runner_kind: non_empty("RUNNER_KIND")
                .unwrap_or_else(|| "script".to_string())
                .to_lowercase(),
            runner_command: non_empty("RUNNER_COMMAND"),
            runner_url: non_empty("RUNNER_URL"),
            runner_timeout: Duration::from_secs(parse_u64(&lookup, "RUNNER_TIMEOUT_SECS", 3600)?),
            poll_interval: Duration::from_millis(parse_u64(&lookup, "WATCH_POLL_MS", 1000)?),
        })
    }

    pub fn runner(&self) -> Result<AnyRunner, RunnerError> {
        AnyRunner::from_parts(
            &self.runner_kind,
            self.runner_command.as_deref(),
            self.runner_url.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.archive_dir, PathBuf::from("archived_summarizers"));
        assert_eq!(s.watch_dir, s.archive_dir);
        assert_eq!(s.runner_kind, "script");
        assert_eq!(s.runner_timeout, Duration::from_secs(3600));
        assert_eq!(s.poll_interval, Duration::from_millis(1000));
        assert!(s.runner().is_err());
    }

    #[test]
    fn explicit_values_win() {
        let s = Settings::from_lookup(lookup(&[
            ("SUMMARIZER_CONFIG_ARCHIVE", "/data/archive"),
            ("WATCH_DIR", "/data/inbox"),
            ("RUNNER_KIND", "HTTP"),
            ("RUNNER_URL", "http://localhost:9000/run"),
            ("RUNNER_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(s.watch_dir, PathBuf::from("/data/inbox"));
        assert_eq!(s.runner_kind, "http");
        assert_eq!(s.runner_timeout, Duration::from_secs(30));
        assert!(s.runner().is_ok());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Settings::from_lookup(lookup(&[("WATCH_POLL_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            SettingsError::Invalid {
                key: "WATCH_POLL_MS",
                value: "soon".into()
            }
        );
        assert!(Settings::from_lookup(lookup(&[("RUNNER_TIMEOUT_SECS", "0")])).is_err());
    }
}

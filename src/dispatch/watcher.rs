use crate::dispatch::model::JobRequest;
use crate::storage::config_store::CONFIG_EXTENSION;
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

/// 轮询目录，发现新出现（或被重写）的配置文件
pub struct DirectoryWatcher {
    dir: PathBuf,
    seen: HashMap<PathBuf, Fingerprint>,
}

fn is_config_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION)
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: HashMap::new(),
        }
    }

    fn list(&self) -> io::Result<Vec<(PathBuf, Fingerprint)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() || !is_config_file(&path) {
                continue;
            }
            out.push((
                path,
                Fingerprint {
                    modified: meta.modified().ok(),
                    len: meta.len(),
                },
            ));
        }
        Ok(out)
    }

    /// 启动时已存在的文件只记录，不触发任务
    pub fn prime(&mut self) -> io::Result<usize> {
        fs::create_dir_all(&self.dir)?;
        let files = self.list()?;
        let n = files.len();
        self.seen = files.into_iter().collect();
        Ok(n)
    }

    /// 返回上次扫描之后新建或内容变化的文件，按修改时间、文件名排序
    pub fn scan(&mut self) -> io::Result<Vec<PathBuf>> {
        let files = self.list()?;
        let mut fresh: Vec<(PathBuf, Fingerprint)> = files
            .iter()
            .filter(|(path, fp)| self.seen.get(path) != Some(fp))
            .cloned()
            .collect();
        self.seen = files.into_iter().collect();

        fresh.sort_by(|a, b| a.1.modified.cmp(&b.1.modified).then_with(|| a.0.cmp(&b.0)));
        Ok(fresh.into_iter().map(|(p, _)| p).collect())
    }

    /// 轮询循环：新文件入队，直到 shutdown 置为 true 或队列关闭
    pub async fn run(
        mut self,
        interval: Duration,
        queue: mpsc::UnboundedSender<JobRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("watching {} every {:?}", self.dir.display(), interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let fresh = match self.scan() {
                Ok(f) => f,
                Err(e) => {
                    warn!("scan of {} failed: {}", self.dir.display(), e);
                    continue;
                }
            };
            for path in fresh {
                info!("new configuration file: {}", path.display());
                if queue.send(JobRequest { config_file: path }).is_err() {
                    warn!("job queue closed, watcher exiting");
                    return;
                }
            }
        }
        info!("watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_new_json_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old_config.json"), "{}").unwrap();

        let mut w = DirectoryWatcher::new(dir.path());
        assert_eq!(w.prime().unwrap(), 1);
        assert!(w.scan().unwrap().is_empty());

        fs::write(dir.path().join("dev_t_config.json"), "{}").unwrap();
        fs::write(dir.path().join("dev_t_config.tmp"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let fresh = w.scan().unwrap();
        assert_eq!(fresh, vec![dir.path().join("dev_t_config.json")]);
        assert!(w.scan().unwrap().is_empty());
    }

    #[test]
    fn rewritten_file_is_reported_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DirectoryWatcher::new(dir.path());
        w.prime().unwrap();

        let path = dir.path().join("prd_t_config.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(w.scan().unwrap().len(), 1);

        fs::write(&path, "{\"changed\": true}").unwrap();
        assert_eq!(w.scan().unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn run_enqueues_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DirectoryWatcher::new(dir.path());
        w.prime().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(w.run(Duration::from_millis(20), tx, stop_rx));

        let path = dir.path().join("dev_a_config.json");
        fs::write(&path, "{}").unwrap();

        let req = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.config_file, path);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

use crate::dispatch::job_id::JobIdAllocator;
use crate::dispatch::model::{JobOutcome, JobRequest, JobStatus};
use crate::dispatch::runner::SummaryRunner;
use crate::storage::config_store::ConfigStore;
use crate::storage::repository::job_repo::now_millis;
use crate::storage::repository::{JobRepository, StatusStoreError};
use crate::summary::keys::{apply_results, configuration_combinations, mark_all};
use crate::summary::model::CombinationStatus;
use log::{error, info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

/// 单消费者：逐个处理队列中的配置文件
pub struct DispatchService {
    db: Arc<DatabaseConnection>,
    runner: Arc<dyn SummaryRunner>,
    runner_timeout: Duration,
    ids: JobIdAllocator,
}

/// 等待取消信号；发送端已关闭则永不返回
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

enum RunEnd {
    Finished(Result<serde_json::Value, String>),
    TimedOut,
    Cancelled,
}

impl DispatchService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        runner: Arc<dyn SummaryRunner>,
        runner_timeout: Duration,
    ) -> Self {
        Self {
            db,
            runner,
            runner_timeout,
            ids: JobIdAllocator::new(),
        }
    }

    /// 启动时的恢复逻辑：上次进程遗留的中间态任务标记为 FAILED
    pub async fn recover(&self) {
        info!("checking for interrupted jobs...");
        match JobRepository::fail_interrupted(&self.db).await {
            Ok(count) if count > 0 => warn!("marked {} interrupted jobs as FAILED", count),
            Ok(_) => info!("no interrupted jobs"),
            Err(e) => error!("recovery failed: {}", e),
        }
    }

    /// 处理一个配置文件，返回最终状态。状态表写入失败时返回错误，由调用方记录
    pub async fn process(
        &mut self,
        req: JobRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<JobOutcome, StatusStoreError> {
        // 与 ConfigStore::save 返回的路径保持一致，便于按 config_file 查询
        let config_file = std::fs::canonicalize(&req.config_file)
            .unwrap_or_else(|_| req.config_file.clone())
            .display()
            .to_string();
        let loaded = ConfigStore::load(&req.config_file);
        let job_id = self.ids.next_id();

        // 1. 反序列化失败：STARTING -> FAILED，不进入 RUNNING
        let config = match loaded {
            Ok(c) => c,
            Err(e) => {
                let msg = e.to_string();
                warn!("✗ [{}] cannot read {}: {}", job_id, config_file, msg);
                JobRepository::insert(&self.db, &job_id, &config_file, now_millis(), &[]).await?;
                JobRepository::mark_failed(&self.db, &job_id, msg.clone(), None).await?;
                return Ok(JobOutcome {
                    job_id,
                    status: JobStatus::Failed,
                    error: Some(msg),
                });
            }
        };

        // 2. STARTING
        let mut combinations = configuration_combinations(&config);
        JobRepository::insert(
            &self.db,
            &job_id,
            &config_file,
            now_millis(),
            &combinations,
        )
        .await?;
        info!(
            "🚀 [{}] job created for {} ({} combinations)",
            job_id,
            config_file,
            combinations.len()
        );

        // 3. RUNNING
        mark_all(&mut combinations, CombinationStatus::Processing);
        JobRepository::mark_running(&self.db, &job_id, combinations.clone()).await?;

        // 4. 调用外部 runner（带超时与取消）
        let runner = self.runner.clone();
        let end = tokio::select! {
            r = tokio::time::timeout(self.runner_timeout, runner.run(&config)) => match r {
                Ok(res) => RunEnd::Finished(res.map_err(|e| e.to_string())),
                Err(_) => RunEnd::TimedOut,
            },
            _ = cancelled(cancel) => RunEnd::Cancelled,
        };

        // 5. COMPLETED / FAILED
        let failure = match end {
            RunEnd::Finished(Ok(results)) => {
                apply_results(&mut combinations, &results);
                mark_all(&mut combinations, CombinationStatus::Completed);
                JobRepository::mark_completed(&self.db, &job_id, results, combinations).await?;
                info!("✓ [{}] completed", job_id);
                return Ok(JobOutcome {
                    job_id,
                    status: JobStatus::Completed,
                    error: None,
                });
            }
            RunEnd::Finished(Err(msg)) => msg,
            RunEnd::TimedOut => format!(
                "runner timed out after {}s",
                self.runner_timeout.as_secs()
            ),
            RunEnd::Cancelled => "cancelled: dispatcher shutting down".to_string(),
        };

        warn!("✗ [{}] failed: {}", job_id, failure);
        mark_all(&mut combinations, CombinationStatus::Failed);
        JobRepository::mark_failed(&self.db, &job_id, failure.clone(), Some(combinations)).await?;
        Ok(JobOutcome {
            job_id,
            status: JobStatus::Failed,
            error: Some(failure),
        })
    }

    /// 消费循环：队列关闭或收到 shutdown 时退出；单个任务出错不影响后续任务
    pub async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<JobRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let req = tokio::select! {
                r = queue.recv() => match r {
                    Some(r) => r,
                    None => break,
                },
                _ = cancelled(&mut shutdown) => break,
            };

            let path = req.config_file.display().to_string();
            match self.process(req, &mut shutdown).await {
                Ok(outcome) => info!(
                    "job {} for {} finished as {}{}",
                    outcome.job_id,
                    path,
                    outcome.status,
                    outcome
                        .error
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                ),
                Err(e) => error!("status store error while processing {}: {}", path, e),
            }
        }
        info!("dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::runner::{RunnerError, ScriptRunner};
    use crate::form::FormState;
    use crate::storage::establish_connection;
    use crate::summary::model::{Configuration, ModelSelection};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Fixed(Result<Value, String>);

    #[async_trait]
    impl SummaryRunner for Fixed {
        async fn run(&self, _config: &Configuration) -> Result<Value, RunnerError> {
            self.0.clone().map_err(RunnerError::InvalidOutput)
        }
    }

    /// 记录调用，运行期间状态应为 RUNNING
    struct Recording {
        db: Arc<DatabaseConnection>,
        seen: Mutex<Vec<JobStatus>>,
    }

    #[async_trait]
    impl SummaryRunner for Recording {
        async fn run(&self, _config: &Configuration) -> Result<Value, RunnerError> {
            let recent = JobRepository::list_recent(&self.db, 1).await.unwrap();
            self.seen.lock().unwrap().push(recent[0].status);
            Ok(json!({"RC_EDI": true, "RC_AE": false}))
        }
    }

    struct Hang;

    #[async_trait]
    impl SummaryRunner for Hang {
        async fn run(&self, _config: &Configuration) -> Result<Value, RunnerError> {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }
    }

    struct Env {
        _dir: tempfile::TempDir,
        db: Arc<DatabaseConnection>,
        store: ConfigStore,
    }

    async fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
        let db = Arc::new(establish_connection(&url).await.unwrap());
        let store = ConfigStore::new(dir.path().join("configs"));
        Env {
            _dir: dir,
            db,
            store,
        }
    }

    fn config() -> Configuration {
        FormState::default()
            .with_table("tbl")
            .with_universe(vec!["SPX".into()])
            .add_model(
                ModelSelection::new("RC", vec!["EDI".into(), "AE".into()], BTreeMap::new())
                    .unwrap(),
            )
            .build_configuration()
            .unwrap()
    }

    fn no_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn successful_run_reaches_completed_via_running() {
        let env = env().await;
        let path = env.store.save(&config()).unwrap();
        let runner = Arc::new(Recording {
            db: env.db.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut svc = DispatchService::new(env.db.clone(), runner.clone(), Duration::from_secs(5));
        let (_tx, mut rx) = no_cancel();

        let outcome = svc
            .process(
                JobRequest {
                    config_file: path.clone(),
                },
                &mut rx,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(*runner.seen.lock().unwrap(), vec![JobStatus::Running]);

        let latest = JobRepository::latest_for_config(&env.db, &path.display().to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.job_id, outcome.job_id);

        let rec = JobRepository::get(&env.db, &outcome.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.results, Some(json!({"RC_EDI": true, "RC_AE": false})));
        assert_eq!(rec.combinations[0].status, CombinationStatus::Completed);
        assert_eq!(rec.combinations[1].status, CombinationStatus::Failed);
        assert!(rec.end_time.is_some());
    }

    #[tokio::test]
    async fn corrupt_config_fails_without_running() {
        let env = env().await;
        std::fs::create_dir_all(env.store.archive_dir()).unwrap();
        let path = env.store.archive_dir().join("dev_bad_config.json");
        std::fs::write(&path, "not json").unwrap();

        let runner = Arc::new(Recording {
            db: env.db.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut svc = DispatchService::new(env.db.clone(), runner.clone(), Duration::from_secs(5));
        let (_tx, mut rx) = no_cancel();

        let outcome = svc
            .process(JobRequest { config_file: path }, &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(runner.seen.lock().unwrap().is_empty());

        let rec = JobRepository::get(&env.db, &outcome.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.unwrap().contains("unreadable"));
        assert!(rec.results.is_none());
    }

    #[tokio::test]
    async fn missing_external_runner_fails_the_job() {
        let env = env().await;
        let path = env.store.save(&config()).unwrap();
        let runner = Arc::new(ScriptRunner::new(
            "/nonexistent/network/summary_script",
            Vec::new(),
        ));
        let mut svc = DispatchService::new(env.db.clone(), runner, Duration::from_secs(5));
        let (_tx, mut rx) = no_cancel();

        let outcome = svc
            .process(JobRequest { config_file: path }, &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);

        let rec = JobRepository::get(&env.db, &outcome.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.unwrap().contains("failed to launch runner"));
        assert!(rec
            .combinations
            .iter()
            .all(|c| c.status == CombinationStatus::Failed));
    }

    #[tokio::test]
    async fn runner_error_text_is_persisted() {
        let env = env().await;
        let path = env.store.save(&config()).unwrap();
        let runner = Arc::new(Fixed(Err("summary blew up".into())));
        let mut svc = DispatchService::new(env.db.clone(), runner, Duration::from_secs(5));
        let (_tx, mut rx) = no_cancel();

        let outcome = svc
            .process(JobRequest { config_file: path }, &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.error.unwrap().contains("summary blew up"));
    }

    #[tokio::test]
    async fn hung_runner_times_out() {
        let env = env().await;
        let path = env.store.save(&config()).unwrap();
        let mut svc = DispatchService::new(env.db.clone(), Arc::new(Hang), Duration::from_millis(50));
        let (_tx, mut rx) = no_cancel();

        let outcome = svc
            .process(JobRequest { config_file: path }, &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_fails_running_job() {
        let env = env().await;
        let path = env.store.save(&config()).unwrap();
        let mut svc = DispatchService::new(env.db.clone(), Arc::new(Hang), Duration::from_secs(60));
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let outcome = svc
            .process(JobRequest { config_file: path }, &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.error.unwrap().starts_with("cancelled"));
    }

    #[tokio::test]
    async fn run_loop_processes_queue_serially_until_closed() {
        let env = env().await;
        let a = env.store.save(&config()).unwrap();
        let mut second = config();
        second.db_table = "other".into();
        let b = env.store.save(&second).unwrap();

        let svc = DispatchService::new(
            env.db.clone(),
            Arc::new(Fixed(Ok(json!({"ok": true})))),
            Duration::from_secs(5),
        );
        let (qtx, qrx) = mpsc::unbounded_channel();
        let (_stop, stop_rx) = watch::channel(false);
        qtx.send(JobRequest { config_file: a }).unwrap();
        qtx.send(JobRequest { config_file: b }).unwrap();
        drop(qtx);

        svc.run(qrx, stop_rx).await;

        let stats = JobRepository::stats(&env.db).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 2);
    }
}

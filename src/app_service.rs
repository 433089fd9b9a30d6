use crate::app_state::AppEvent;
use crate::dispatch::model::JobStatus;
use crate::storage::repository::{JobRecord, JobRepository};
use log::warn;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const RECENT_JOBS: u64 = 50;

pub async fn refresh_ui(db: &Arc<DatabaseConnection>, tx: &mpsc::UnboundedSender<AppEvent>) {
    // 1. 最近的任务
    match JobRepository::list_recent(db, RECENT_JOBS).await {
        Ok(jobs) => {
            let _ = tx.send(AppEvent::Jobs(jobs));
        }
        Err(e) => warn!("refresh jobs failed: {}", e),
    }

    // 2. 状态统计
    if let Ok(stats) = JobRepository::stats(db).await {
        let _ = tx.send(AppEvent::Stats(stats));
    }
}

/// 一行进度描述，供日志区展示
pub fn describe(job: &JobRecord) -> String {
    let prefix = match job.status {
        JobStatus::Completed => "✓",
        JobStatus::Failed => "✗",
        _ => "⚠",
    };
    let mut line = format!(
        "{} [{}] {} ({} 个组合)",
        prefix,
        job.job_id,
        job.status,
        job.combinations.len()
    );
    if let Some(err) = &job.error {
        line.push_str(&format!(": {}", err));
    }
    line
}

/// 跟踪某个配置文件触发的最新任务，直到进入终态
pub async fn follow_config(
    db: Arc<DatabaseConnection>,
    config_file: String,
    tx: mpsc::UnboundedSender<AppEvent>,
    poll: std::time::Duration,
    rounds: usize,
) {
    let mut last: Option<JobStatus> = None;
    for _ in 0..rounds {
        match JobRepository::latest_for_config(&db, &config_file).await {
            Ok(Some(job)) => {
                if last != Some(job.status) {
                    last = Some(job.status);
                    let _ = tx.send(AppEvent::Log(describe(&job)));
                }
                if job.status.is_terminal() {
                    let _ = tx.send(AppEvent::Job(job));
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(AppEvent::Error(format!("✗ 查询任务状态失败: {}", e)));
                return;
            }
        }
        tokio::time::sleep(poll).await;
    }
}

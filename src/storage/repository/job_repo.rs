use crate::dispatch::model::JobStatus;
use crate::storage::entity::summary_job::{
    self, ActiveModel as SummaryJobActiveModel, Entity as SummaryJob,
};
use crate::summary::model::Combination;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum StatusStoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("unknown job id {0}")]
    UnknownJob(String),
    #[error("corrupt job row {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },
}

/// 状态表中一行的解析视图
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub config_file: String,
    pub status: JobStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub combinations: Vec<Combination>,
    pub results: Option<Value>,
    pub error: Option<String>,
}

impl TryFrom<summary_job::Model> for JobRecord {
    type Error = StatusStoreError;

    fn try_from(m: summary_job::Model) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StatusStoreError::Corrupt {
            job_id: m.job_id.clone(),
            reason,
        };
        let status = m
            .status
            .parse::<JobStatus>()
            .map_err(|_| corrupt(format!("status {}", m.status)))?;
        let combinations = match m.combinations.as_deref() {
            Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?,
            None => Vec::new(),
        };
        let results = match m.results.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?),
            None => None,
        };

        Ok(JobRecord {
            job_id: m.job_id,
            config_file: m.config_file,
            status,
            start_time: m.start_time,
            end_time: m.end_time,
            combinations,
            results,
            error: m.error,
        })
    }
}

/// 一次状态更新；None 表示该列保持不变
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub end_time: Option<i64>,
    pub combinations: Option<Vec<Combination>>,
    pub results: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub starting: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

fn encode(combinations: &[Combination]) -> String {
    serde_json::to_string(combinations).unwrap_or_else(|_| "[]".to_string())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct JobRepository;

impl JobRepository {
    pub async fn insert(
        db: &DatabaseConnection,
        job_id: &str,
        config_file: &str,
        start_time: i64,
        combinations: &[Combination],
    ) -> Result<(), StatusStoreError> {
        let active_model = SummaryJobActiveModel {
            job_id: Set(job_id.to_string()),
            config_file: Set(config_file.to_string()),
            status: Set(JobStatus::Starting.as_str().to_string()),
            start_time: Set(start_time),
            end_time: Set(None),
            combinations: Set(Some(encode(combinations))),
            results: Set(None),
            error: Set(None),
        };
        active_model.insert(db).await?;
        Ok(())
    }

    /// 按 job_id 更新；不存在的 job_id 返回 UnknownJob，不静默忽略
    pub async fn update(
        db: &DatabaseConnection,
        job_id: &str,
        status: JobStatus,
        change: JobUpdate,
    ) -> Result<(), StatusStoreError> {
        let mut query = SummaryJob::update_many()
            .col_expr(summary_job::Column::Status, Expr::value(status.as_str()));
        if let Some(t) = change.end_time {
            query = query.col_expr(summary_job::Column::EndTime, Expr::value(t));
        }
        if let Some(c) = change.combinations {
            query = query.col_expr(summary_job::Column::Combinations, Expr::value(encode(&c)));
        }
        if let Some(r) = change.results {
            query = query.col_expr(summary_job::Column::Results, Expr::value(r.to_string()));
        }
        if let Some(e) = change.error {
            query = query.col_expr(summary_job::Column::Error, Expr::value(e));
        }

        let res = query
            .filter(summary_job::Column::JobId.eq(job_id))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Err(StatusStoreError::UnknownJob(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn mark_running(
        db: &DatabaseConnection,
        job_id: &str,
        combinations: Vec<Combination>,
    ) -> Result<(), StatusStoreError> {
        Self::update(
            db,
            job_id,
            JobStatus::Running,
            JobUpdate {
                combinations: Some(combinations),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_completed(
        db: &DatabaseConnection,
        job_id: &str,
        results: Value,
        combinations: Vec<Combination>,
    ) -> Result<(), StatusStoreError> {
        Self::update(
            db,
            job_id,
            JobStatus::Completed,
            JobUpdate {
                end_time: Some(now_millis()),
                combinations: Some(combinations),
                results: Some(results),
                error: None,
            },
        )
        .await
    }

    pub async fn mark_failed(
        db: &DatabaseConnection,
        job_id: &str,
        error: String,
        combinations: Option<Vec<Combination>>,
    ) -> Result<(), StatusStoreError> {
        Self::update(
            db,
            job_id,
            JobStatus::Failed,
            JobUpdate {
                end_time: Some(now_millis()),
                combinations,
                results: None,
                error: Some(error),
            },
        )
        .await
    }

    pub async fn get(
        db: &DatabaseConnection,
        job_id: &str,
    ) -> Result<Option<JobRecord>, StatusStoreError> {
        SummaryJob::find_by_id(job_id.to_string())
            .one(db)
            .await?
            .map(JobRecord::try_from)
            .transpose()
    }

    /// 某个配置文件最近一次触发的任务
    pub async fn latest_for_config(
        db: &DatabaseConnection,
        config_file: &str,
    ) -> Result<Option<JobRecord>, StatusStoreError> {
        SummaryJob::find()
            .filter(summary_job::Column::ConfigFile.eq(config_file))
            .order_by_desc(summary_job::Column::StartTime)
            .order_by_desc(summary_job::Column::JobId)
            .one(db)
            .await?
            .map(JobRecord::try_from)
            .transpose()
    }

    pub async fn list_recent(
        db: &DatabaseConnection,
        limit: u64,
    ) -> Result<Vec<JobRecord>, StatusStoreError> {
        SummaryJob::find()
            .order_by_desc(summary_job::Column::StartTime)
            .order_by_desc(summary_job::Column::JobId)
            .limit(limit)
            .all(db)
            .await?
            .into_iter()
            .map(JobRecord::try_from)
            .collect()
    }

    pub async fn stats(db: &DatabaseConnection) -> Result<JobStats, StatusStoreError> {
        let count = |status: JobStatus| {
            SummaryJob::find()
                .filter(summary_job::Column::Status.eq(status.as_str()))
                .count(db)
        };

        Ok(JobStats {
            total: SummaryJob::find().count(db).await? as usize,
            starting: count(JobStatus::Starting).await? as usize,
            running: count(JobStatus::Running).await? as usize,
            completed: count(JobStatus::Completed).await? as usize,
            failed: count(JobStatus::Failed).await? as usize,
        })
    }

    /// 启动时清理中间态：上一个进程遗留的 STARTING/RUNNING 视为失败（不重试）
    pub async fn fail_interrupted(db: &DatabaseConnection) -> Result<u64, StatusStoreError> {
        let now = now_millis();
        let res = SummaryJob::update_many()
            .col_expr(
                summary_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(summary_job::Column::EndTime, Expr::value(now))
            .col_expr(
                summary_job::Column::Error,
                Expr::value("interrupted: dispatcher stopped before the job finished"),
            )
            .filter(
                summary_job::Column::Status
                    .eq(JobStatus::Starting.as_str())
                    .or(summary_job::Column::Status.eq(JobStatus::Running.as_str())),
            )
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::establish_connection;
    use crate::summary::model::CombinationStatus;

    async fn temp_db() -> (tempfile::TempDir, DatabaseConnection) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
        let db = establish_connection(&url).await.unwrap();
        (dir, db)
    }

    fn combo(key: &str) -> Combination {
        Combination {
            key: key.to_string(),
            implementation: "RC".into(),
            leverage: "EDI".into(),
            frontier: None,
            status: CombinationStatus::Pending,
        }
    }

    #[tokio::test]
    async fn insert_then_walk_to_completed() {
        let (_dir, db) = temp_db().await;
        JobRepository::insert(&db, "job_1", "/cfg/a.json", 10, &[combo("RC_EDI")])
            .await
            .unwrap();

        let rec = JobRepository::get(&db, "job_1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Starting);
        assert_eq!(rec.end_time, None);
        assert_eq!(rec.results, None);
        assert_eq!(rec.combinations.len(), 1);

        JobRepository::mark_running(&db, "job_1", vec![combo("RC_EDI")])
            .await
            .unwrap();
        let rec = JobRepository::get(&db, "job_1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Running);
        assert!(rec.results.is_none());

        let results = serde_json::json!({"RC_EDI": true});
        JobRepository::mark_completed(&db, "job_1", results.clone(), vec![combo("RC_EDI")])
            .await
            .unwrap();
        let rec = JobRepository::get(&db, "job_1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.results, Some(results));
        assert!(rec.end_time.is_some());
    }

    #[tokio::test]
    async fn updating_unknown_job_is_an_error() {
        let (_dir, db) = temp_db().await;
        let err = JobRepository::mark_failed(&db, "nope", "boom".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusStoreError::UnknownJob(id) if id == "nope"));
        assert!(JobRepository::get(&db, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_for_config_and_stats() {
        let (_dir, db) = temp_db().await;
        JobRepository::insert(&db, "job_a", "/cfg/x.json", 1, &[]).await.unwrap();
        JobRepository::insert(&db, "job_b", "/cfg/x.json", 2, &[]).await.unwrap();
        JobRepository::insert(&db, "job_c", "/cfg/y.json", 3, &[]).await.unwrap();
        JobRepository::mark_failed(&db, "job_a", "bad".into(), None)
            .await
            .unwrap();

        let latest = JobRepository::latest_for_config(&db, "/cfg/x.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.job_id, "job_b");

        let stats = JobRepository::stats(&db).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.starting, 2);
        assert_eq!(stats.failed, 1);

        let recent = JobRepository::list_recent(&db, 2).await.unwrap();
        assert_eq!(
            recent.iter().map(|r| r.job_id.as_str()).collect::<Vec<_>>(),
            vec!["job_c", "job_b"]
        );
    }

    #[tokio::test]
    async fn interrupted_jobs_are_failed_on_recovery() {
        let (_dir, db) = temp_db().await;
        JobRepository::insert(&db, "job_1", "/cfg/a.json", 1, &[]).await.unwrap();
        JobRepository::insert(&db, "job_2", "/cfg/b.json", 2, &[]).await.unwrap();
        JobRepository::mark_completed(&db, "job_2", Value::Null, Vec::new())
            .await
            .unwrap();

        assert_eq!(JobRepository::fail_interrupted(&db).await.unwrap(), 1);
        let rec = JobRepository::get(&db, "job_1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.unwrap().starts_with("interrupted"));
    }
}

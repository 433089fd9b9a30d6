use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "summary_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_id: String,
    pub config_file: String,
    pub status: String, // STARTING/RUNNING/COMPLETED/FAILED
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub combinations: Option<String>, // JSON: Vec<Combination>
    pub results: Option<String>,      // JSON: runner 原样返回
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

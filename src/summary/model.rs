use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const UNIVERSE_OPTIONS: [&str; 4] = ["FR1", "FR3", "SPX", "GLOBAL"];
pub const MODEL_IMPLEMENTATIONS: [&str; 4] = ["RC", "LS", "BLS", "CLS"];
pub const MODEL_LEVERAGES: [&str; 5] = ["EDI", "AE", "AEP", "AEPP", "AEPPP"];

pub const MIN_FEE: f64 = -0.05;
pub const MAX_FEE: f64 = 0.0;
pub const MIN_YEAR: i32 = 1985;
pub const MAX_YEAR: i32 = 2100;

/// 默认费率（未显式指定时使用）
pub fn default_fee(leverage: &str) -> f64 {
    match leverage {
        "EDI" => -0.0035,
        "AE" => -0.01,
        "AEP" => -0.015,
        "AEPP" => -0.02,
        "AEPPP" => -0.025,
        _ => 0.0,
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("db_table must not be empty")]
    MissingTable,
    #[error("at least one universe is required")]
    EmptyUniverse,
    #[error("at least one model configuration is required")]
    EmptyModels,
    #[error("implementation name must not be empty")]
    EmptyImplementation,
    #[error("implementation {0} has no leverages selected")]
    EmptyLeverages(String),
    #[error("fee for {leverage} is {fee}, expected a value in [-0.05, 0]")]
    FeeOutOfRange { leverage: String, fee: f64 },
    #[error("fee given for {0} which is not a selected leverage")]
    FeeWithoutLeverage(String),
    #[error("malformed year range: {0}")]
    BadYearRange(String),
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("unknown version: {0}")]
    UnknownVersion(String),
    #[error("frontier point needs a name and at least one value")]
    EmptyFrontierPoint,
    #[error("{0} is a built-in placeholder and cannot name a frontier point")]
    ReservedFrontierKey(String),
    #[error("no model configuration at index {0}")]
    NoSuchModel(usize),
    #[error("frontier point {key} has no value {value}")]
    NoSuchFrontierValue { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Dev,
    RschDev,
    Rsch,
    Prd,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::RschDev,
        Environment::Rsch,
        Environment::Prd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::RschDev => "rsch_dev",
            Environment::Rsch => "rsch",
            Environment::Prd => "prd",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        Environment::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == t)
            .ok_or_else(|| ValidationError::UnknownEnvironment(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Version {
    #[serde(rename = "2023")]
    V2023,
    #[default]
    #[serde(rename = "2024")]
    V2024,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V2023 => "2023",
            Version::V2024 => "2024",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2023" => Ok(Version::V2023),
            "2024" => Ok(Version::V2024),
            other => Err(ValidationError::UnknownVersion(other.to_string())),
        }
    }
}

/// 起始年份区间，序列化为 "<begin>-<end>"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub begin: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(begin: i32, end: i32) -> Result<Self, ValidationError> {
        let in_bounds = |y: i32| (MIN_YEAR..=MAX_YEAR).contains(&y);
        if begin > end || !in_bounds(begin) || !in_bounds(end) {
            return Err(ValidationError::BadYearRange(format!("{}-{}", begin, end)));
        }
        Ok(Self { begin, end })
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            begin: 1999,
            end: 2024,
        }
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.begin, self.end)
    }
}

impl FromStr for YearRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ValidationError::BadYearRange(s.to_string());
        let (b, e) = s.trim().split_once('-').ok_or_else(bad)?;
        let begin = b.trim().parse::<i32>().map_err(|_| bad())?;
        let end = e.trim().parse::<i32>().map_err(|_| bad())?;
        YearRange::new(begin, end)
    }
}

impl Serialize for YearRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub implementation: String,
    pub leverages: Vec<String>,
    pub fees: BTreeMap<String, f64>,
}

impl ModelSelection {
    /// 校验并构造。`fees` 中缺失的杠杆使用默认费率补齐
    pub fn new(
        implementation: impl Into<String>,
        leverages: Vec<String>,
        mut fees: BTreeMap<String, f64>,
    ) -> Result<Self, ValidationError> {
        let implementation = implementation.into().trim().to_string();
        if implementation.is_empty() {
            return Err(ValidationError::EmptyImplementation);
        }

        let mut ordered: Vec<String> = Vec::new();
        for lev in leverages {
            let lev = lev.trim().to_string();
            if !lev.is_empty() && !ordered.contains(&lev) {
                ordered.push(lev);
            }
        }
        if ordered.is_empty() {
            return Err(ValidationError::EmptyLeverages(implementation));
        }

        if let Some(stray) = fees.keys().find(|k| !ordered.contains(k)) {
            return Err(ValidationError::FeeWithoutLeverage(stray.clone()));
        }
        for lev in &ordered {
            fees.entry(lev.clone()).or_insert_with(|| default_fee(lev));
        }
        if let Some((lev, fee)) = fees
            .iter()
            .find(|(_, fee)| !(MIN_FEE..=MAX_FEE).contains(*fee))
        {
            return Err(ValidationError::FeeOutOfRange {
                leverage: lev.clone(),
                fee: *fee,
            });
        }

        Ok(Self {
            implementation,
            leverages: ordered,
            fees,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub key: String,
    pub points: Vec<String>,
}

impl FrontierPoint {
    /// 追加不存在的值，返回新增数量
    pub fn absorb<I: IntoIterator<Item = String>>(&mut self, values: I) -> usize {
        let mut added = 0;
        for v in values {
            if !self.points.contains(&v) {
                self.points.push(v);
                added += 1;
            }
        }
        added
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombinationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CombinationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombinationStatus::Pending => "pending",
            CombinationStatus::Processing => "processing",
            CombinationStatus::Completed => "completed",
            CombinationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CombinationStatus::Completed | CombinationStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub key: String,
    #[serde(rename = "impl")]
    pub implementation: String,
    #[serde(rename = "lev")]
    pub leverage: String,
    pub frontier: Option<String>,
    #[serde(default)]
    pub status: CombinationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub universe: Vec<String>,
    pub db_table: String,
    pub environment: Environment,
    pub backtest_user: String,
    pub start_years: YearRange,
    pub model_keys: Vec<String>,
    pub model_configs: Vec<ModelSelection>,
    pub frontier_points: Vec<FrontierPoint>,
    pub run_on_cluster: bool,
    pub version: Version,
    #[serde(default)]
    pub template: Option<String>,
}

/// 面向用户展示的配置摘要（JSON）
pub fn format_config(config: &Configuration) -> String {
    let view = serde_json::json!({
        "universe": config.universe,
        "db_table": config.db_table,
        "environment": config.environment,
        "backtest_user": config.backtest_user,
        "start_years": config.start_years,
        "model_keys": config.model_keys,
        "frontier_points": config.frontier_points,
        "run_on_cluster": config.run_on_cluster,
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
}

use crate::summary::keys::{model_keys_for, total_combinations};
use crate::summary::model::{
    Configuration, Environment, FrontierPoint, ModelSelection, ValidationError,
    Version, YearRange,
};
use crate::summary::template::{
    example_strings, TemplateError, BUILTIN_PLACEHOLDERS, DEFAULT_TEMPLATE,
};

/// 表单状态。每次交互产生新的 FormState，旧值不被修改
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub environment: Environment,
    pub db_table: String,
    pub universe: Vec<String>,
    pub backtest_user: String,
    pub years: YearRange,
    pub model_selections: Vec<ModelSelection>,
    pub frontier_points: Vec<FrontierPoint>,
    pub template: String,
    pub version: Version,
    pub run_on_cluster: bool,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            db_table: String::new(),
            universe: Vec::new(),
            backtest_user: String::new(),
            years: YearRange::default(),
            model_selections: Vec::new(),
            frontier_points: Vec::new(),
            template: DEFAULT_TEMPLATE.to_string(),
            version: Version::default(),
            run_on_cluster: false,
        }
    }
}

/// 逗号分隔的取值，去空白、去空项、去重（保序）
pub fn parse_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in raw.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        if !out.iter().any(|x| x == v) {
            out.push(v.to_string());
        }
    }
    out
}

impl FormState {
    pub fn with_environment(self, environment: Environment) -> Self {
        Self {
            environment,
            ..self
        }
    }

    pub fn with_table(self, db_table: &str) -> Self {
        Self {
            db_table: db_table.trim().to_string(),
            ..self
        }
    }

    pub fn with_user(self, backtest_user: &str) -> Self {
        Self {
            backtest_user: backtest_user.trim().to_string(),
            ..self
        }
    }

    pub fn with_universe(self, universe: Vec<String>) -> Self {
        Self { universe, ..self }
    }

    pub fn with_years(self, years: YearRange) -> Self {
        Self { years, ..self }
    }

    pub fn with_version(self, version: Version) -> Self {
        Self { version, ..self }
    }

    pub fn with_cluster(self, run_on_cluster: bool) -> Self {
        Self {
            run_on_cluster,
            ..self
        }
    }

    pub fn with_template(self, template: &str) -> Self {
        Self {
            template: template.to_string(),
            ..self
        }
    }

    pub fn add_model(mut self, selection: ModelSelection) -> Self {
        self.model_selections.push(selection);
        self
    }

    pub fn remove_model(mut self, index: usize) -> Result<Self, ValidationError> {
        if index >= self.model_selections.len() {
            return Err(ValidationError::NoSuchModel(index));
        }
        self.model_selections.remove(index);
        Ok(self)
    }

    /// "add point"：同名 frontier 合并取值，不产生重复条目
    pub fn add_frontier_points(
        mut self,
        key: &str,
        raw_values: &str,
    ) -> Result<Self, ValidationError> {
        let key = key.trim();
        let values = parse_list(raw_values);
        if key.is_empty() || values.is_empty() {
            return Err(ValidationError::EmptyFrontierPoint);
        }
        if BUILTIN_PLACEHOLDERS.contains(&key) {
            return Err(ValidationError::ReservedFrontierKey(key.to_string()));
        }

        match self.frontier_points.iter_mut().find(|p| p.key == key) {
            Some(point) => {
                point.absorb(values);
            }
            None => self.frontier_points.push(FrontierPoint {
                key: key.to_string(),
                points: values,
            }),
        }
        Ok(self)
    }

    /// 删除一个取值；删掉最后一个取值时整个 frontier point 一并移除
    pub fn remove_frontier_value(
        mut self,
        key: &str,
        value: &str,
    ) -> Result<Self, ValidationError> {
        let missing = || ValidationError::NoSuchFrontierValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let idx = self
            .frontier_points
            .iter()
            .position(|p| p.key == key)
            .ok_or_else(missing)?;

        let point = &mut self.frontier_points[idx];
        let before = point.points.len();
        point.points.retain(|p| p != value);
        if point.points.len() == before {
            return Err(missing());
        }
        if point.points.is_empty() {
            self.frontier_points.remove(idx);
        }
        Ok(self)
    }

    pub fn model_keys(&self) -> Vec<String> {
        model_keys_for(&self.model_selections)
    }

    pub fn total_combinations(&self) -> usize {
        total_combinations(
            self.universe.len(),
            &self.model_selections,
            &self.frontier_points,
        )
    }

    /// 不做校验的配置快照，用于预览
    pub fn snapshot(&self) -> Configuration {
        Configuration {
            universe: self.universe.clone(),
            db_table: self.db_table.clone(),
            environment: self.environment,
            backtest_user: self.backtest_user.clone(),
            start_years: self.years,
            model_keys: self.model_keys(),
            model_configs: self.model_selections.clone(),
            frontier_points: self.frontier_points.clone(),
            run_on_cluster: self.run_on_cluster,
            version: self.version,
            template: Some(self.template.clone()),
        }
    }

    pub fn examples(&self) -> Result<Vec<String>, TemplateError> {
        example_strings(&self.template, &self.snapshot())
    }

    /// 提交前校验
    pub fn build_configuration(&self) -> Result<Configuration, ValidationError> {
        if self.db_table.is_empty() {
            return Err(ValidationError::MissingTable);
        }
        if self.universe.is_empty() {
            return Err(ValidationError::EmptyUniverse);
        }
        if self.model_selections.is_empty() {
            return Err(ValidationError::EmptyModels);
        }
        Ok(self.snapshot())
    }
}

use crate::summary::model::Configuration;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_TEMPLATE: &str = "SSF2_{MODEL_KEY}_{UNIVERSE}_{YEAR}";

/// 内置占位符，frontier point 不能使用这些名字
pub const BUILTIN_PLACEHOLDERS: [&str; 9] = [
    "UNIVERSE",
    "YEAR",
    "START_YEARS",
    "MODEL_KEY",
    "MODEL_KEYS",
    "DB_TABLE",
    "ENVIRONMENT",
    "BACKTEST_USER",
    "VERSION",
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("missing variable {0}")]
    MissingVariable(String),
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{` 与 `}}` 是字面量花括号
    RE.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("placeholder regex"))
}

/// 列出模板中的占位符（按出现顺序，可能重复）
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// 替换全部 `{NAME}`；任何一个缺失即整体失败，不返回部分结果
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(TemplateError::MissingVariable(missing));
    }

    let out = placeholder_re().replace_all(template, |caps: &regex::Captures| match caps.get(1) {
        Some(name) => vars.get(name.as_str().trim()).cloned().unwrap_or_default(),
        None => caps[0][..1].to_string(),
    });
    Ok(out.into_owned())
}

/// 取每个多值输入的首个（或末个）取值构造占位符映射
fn variables_for(
    config: &Configuration,
    model_keys: &[String],
    last: bool,
) -> HashMap<String, String> {
    let pick = |list: &[String]| -> String {
        let v = if last { list.last() } else { list.first() };
        v.cloned().unwrap_or_default()
    };

    let mut vars = HashMap::new();
    vars.insert("UNIVERSE".to_string(), pick(&config.universe));
    vars.insert("YEAR".to_string(), config.start_years.begin.to_string());
    vars.insert("START_YEARS".to_string(), config.start_years.to_string());
    vars.insert("MODEL_KEY".to_string(), pick(model_keys));
    vars.insert("MODEL_KEYS".to_string(), model_keys.join(","));
    vars.insert("DB_TABLE".to_string(), config.db_table.clone());
    vars.insert("ENVIRONMENT".to_string(), config.environment.to_string());
    vars.insert("BACKTEST_USER".to_string(), config.backtest_user.clone());
    vars.insert("VERSION".to_string(), config.version.to_string());
    for point in &config.frontier_points {
        if !point.key.is_empty() && !point.points.is_empty() {
            vars.insert(point.key.clone(), pick(&point.points));
        }
    }
    vars
}

/// 生成两条示例：分别取每个多值输入的首个与末个取值；两者相同只返回一条
pub fn example_strings(
    template: &str,
    config: &Configuration,
) -> Result<Vec<String>, TemplateError> {
    if config.universe.is_empty() || config.model_keys.is_empty() {
        return Ok(Vec::new());
    }

    let first = render(template, &variables_for(config, &config.model_keys, false))?;
    let last = render(template, &variables_for(config, &config.model_keys, true))?;

    let mut examples = vec![first];
    if last != examples[0] {
        examples.push(last);
    }
    Ok(examples)
}

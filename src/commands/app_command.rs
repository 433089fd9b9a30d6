use crate::form::parse_list;
use crate::storage::config_store::SavePolicy;
use crate::summary::model::{Environment, Version, YearRange};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    SetEnvironment(Environment),
    SetTable(String),
    SetUser(String),
    SetUniverse(Vec<String>),
    SetYears(YearRange),
    SetVersion(Version),
    SetCluster(bool),
    SetTemplate(String),
    AddModel {
        implementation: String,
        leverages: Vec<String>,
        fees: BTreeMap<String, f64>,
    },
    RemoveModel(usize),
    AddPoint {
        key: String,
        values: String,
    },
    RemovePoint {
        key: String,
        value: String,
    },
    Reset,
    Show,
    Examples,
    Run(SavePolicy),
    Job(Option<String>),
    Jobs,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "可用命令: env <dev|rsch_dev|rsch|prd> | table <name> | user <name> | universe <A,B> | years <begin-end> | version <2023|2024> | cluster <on|off> | template <text> ({{ }} 为字面花括号) | model add <impl> <LEV[=fee]>... | model rm <i> | point add <key> <v1,v2> | point rm <key> <value> | show | examples | run [merge|overwrite] | job [id] | jobs | reset | quit";

fn usage(text: &str) -> AppCommand {
    AppCommand::Unknown(format!("用法: {}", text))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" => Some(true),
        "0" | "false" | "no" | "off" | "n" => Some(false),
        _ => None,
    }
}

/// `EDI AE=-0.012` 形式的杠杆列表，也接受逗号分隔
fn parse_leverages(tokens: &[&str]) -> Result<(Vec<String>, BTreeMap<String, f64>), String> {
    let mut leverages = Vec::new();
    let mut fees = BTreeMap::new();
    for tok in tokens.iter().flat_map(|t| t.split(',')) {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        match tok.split_once('=') {
            Some((lev, fee)) => {
                let fee = fee
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("费率必须是数字: {}", tok))?;
                leverages.push(lev.trim().to_string());
                fees.insert(lev.trim().to_string(), fee);
            }
            None => leverages.push(tok.to_string()),
        }
    }
    Ok((leverages, fees))
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }
        let rest = || parts[1..].join(" ");
        // 命令词之后的原始文本，保留内部空白
        let raw_rest = || {
            s.trim_start()
                .split_once(char::is_whitespace)
                .map(|(_, r)| r.trim_start().to_string())
                .unwrap_or_default()
        };

        match parts[0] {
            "env" | "environment" => match parts.get(1).map(|s| s.parse::<Environment>()) {
                Some(Ok(env)) => Ok(AppCommand::SetEnvironment(env)),
                Some(Err(e)) => Ok(AppCommand::Unknown(e.to_string())),
                None => Ok(usage("env <dev|rsch_dev|rsch|prd>")),
            },
            "table" => match parts.get(1) {
                Some(t) => Ok(AppCommand::SetTable(t.to_string())),
                None => Ok(usage("table <db_table>")),
            },
            "user" => match parts.get(1) {
                Some(u) => Ok(AppCommand::SetUser(u.to_string())),
                None => Ok(usage("user <backtest_user>")),
            },
            "universe" => {
                let list = parse_list(&rest());
                if list.is_empty() {
                    Ok(usage("universe <FR1,SPX,...>"))
                } else {
                    Ok(AppCommand::SetUniverse(list))
                }
            }
            "years" => match rest().replace(' ', "").parse::<YearRange>() {
                Ok(r) => Ok(AppCommand::SetYears(r)),
                Err(e) => Ok(AppCommand::Unknown(e.to_string())),
            },
            "version" => match parts.get(1).map(|s| s.parse::<Version>()) {
                Some(Ok(v)) => Ok(AppCommand::SetVersion(v)),
                Some(Err(e)) => Ok(AppCommand::Unknown(e.to_string())),
                None => Ok(usage("version <2023|2024>")),
            },
            "cluster" => match parts.get(1).and_then(|s| parse_bool(s)) {
                Some(b) => Ok(AppCommand::SetCluster(b)),
                None => Ok(usage("cluster <on|off>")),
            },
            "template" => {
                let t = raw_rest();
                if t.is_empty() {
                    Ok(usage("template <text with {PLACEHOLDERS}>"))
                } else {
                    Ok(AppCommand::SetTemplate(t))
                }
            }
            "model" => match (parts.get(1).copied(), parts.get(2)) {
                (Some("add"), Some(imp)) => match parse_leverages(&parts[3..]) {
                    Ok((leverages, fees)) => Ok(AppCommand::AddModel {
                        implementation: imp.to_string(),
                        leverages,
                        fees,
                    }),
                    Err(msg) => Ok(AppCommand::Unknown(msg)),
                },
                (Some("rm"), Some(idx)) => match idx.parse::<usize>() {
                    Ok(i) => Ok(AppCommand::RemoveModel(i)),
                    Err(_) => Ok(usage("model rm <index>")),
                },
                _ => Ok(usage("model add <impl> <LEV[=fee]>... | model rm <index>")),
            },
            "point" => match (parts.get(1).copied(), parts.get(2)) {
                (Some("add"), Some(key)) if parts.len() > 3 => Ok(AppCommand::AddPoint {
                    key: key.to_string(),
                    values: parts[3..].join(" "),
                }),
                (Some("rm"), Some(key)) if parts.len() > 3 => Ok(AppCommand::RemovePoint {
                    key: key.to_string(),
                    value: parts[3..].join(" "),
                }),
                _ => Ok(usage("point add <key> <v1,v2> | point rm <key> <value>")),
            },
            "reset" => Ok(AppCommand::Reset),
            "show" => Ok(AppCommand::Show),
            "examples" | "ex" => Ok(AppCommand::Examples),
            "run" => match parts.get(1).copied() {
                None => Ok(AppCommand::Run(SavePolicy::Reject)),
                Some("merge") => Ok(AppCommand::Run(SavePolicy::Merge)),
                Some("overwrite") => Ok(AppCommand::Run(SavePolicy::Overwrite)),
                Some(_) => Ok(usage("run [merge|overwrite]")),
            },
            "job" => Ok(AppCommand::Job(parts.get(1).map(|s| s.to_string()))),
            "jobs" => Ok(AppCommand::Jobs),
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

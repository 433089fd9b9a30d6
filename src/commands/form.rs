use crate::commands::AppCommand;
use crate::form::FormState;
use crate::summary::model::{ModelSelection, ValidationError};

/// 表单编辑类命令：由旧状态得到新状态与一条提示。非表单命令返回 None
pub fn apply(
    form: &FormState,
    cmd: &AppCommand,
) -> Option<Result<(FormState, String), ValidationError>> {
    let base = form.clone();
    let result = match cmd {
        AppCommand::SetEnvironment(env) => Ok((
            base.with_environment(*env),
            format!("environment = {}", env),
        )),
        AppCommand::SetTable(t) => Ok((base.with_table(t), format!("db_table = {}", t))),
        AppCommand::SetUser(u) => Ok((base.with_user(u), format!("backtest_user = {}", u))),
        AppCommand::SetUniverse(list) => Ok((
            base.with_universe(list.clone()),
            format!("universe = {}", list.join(",")),
        )),
        AppCommand::SetYears(r) => Ok((base.with_years(*r), format!("start_years = {}", r))),
        AppCommand::SetVersion(v) => Ok((base.with_version(*v), format!("version = {}", v))),
        AppCommand::SetCluster(b) => Ok((base.with_cluster(*b), format!("run_on_cluster = {}", b))),
        AppCommand::SetTemplate(t) => Ok((base.with_template(t), format!("template = {}", t))),
        AppCommand::AddModel {
            implementation,
            leverages,
            fees,
        } => ModelSelection::new(implementation.as_str(), leverages.clone(), fees.clone())
            .map(|sel| {
                let msg = format!(
                    "已添加模型 {} [{}]",
                    sel.implementation,
                    sel.leverages.join(", ")
                );
                (base.add_model(sel), msg)
            }),
        AppCommand::RemoveModel(i) => base
            .remove_model(*i)
            .map(|f| (f, format!("已删除模型 #{}", i))),
        AppCommand::AddPoint { key, values } => base
            .add_frontier_points(key, values)
            .map(|f| (f, format!("已添加 frontier point {}", key))),
        AppCommand::RemovePoint { key, value } => base
            .remove_frontier_value(key, value)
            .map(|f| (f, format!("已删除 {} 的取值 {}", key, value))),
        AppCommand::Reset => Ok((FormState::default(), "表单已重置".to_string())),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(form: FormState, line: &str) -> Result<FormState, ValidationError> {
        let cmd: AppCommand = line.parse().unwrap();
        apply(&form, &cmd).expect("form command").map(|(f, _)| f)
    }

    #[test]
    fn commands_build_up_a_form() {
        let form = FormState::default();
        let form = run(form, "table omni").unwrap();
        let form = run(form, "universe SPX,FR1").unwrap();
        let form = run(form, "model add RC EDI AE=-0.012").unwrap();
        let form = run(form, "point add SECTOR TECH").unwrap();
        let form = run(form, "point add SECTOR ENERGY").unwrap();

        assert_eq!(form.model_keys(), vec!["RC_EDI", "RC_AE"]);
        assert_eq!(form.model_selections[0].fees["AE"], -0.012);
        assert_eq!(form.frontier_points.len(), 1);
        assert_eq!(form.total_combinations(), 2 * 2 * 2);
    }

    #[test]
    fn invalid_edit_keeps_old_state_available() {
        let form = run(FormState::default(), "table omni").unwrap();
        let err = run(form.clone(), "model add RC AE=0.3").unwrap_err();
        assert!(matches!(err, ValidationError::FeeOutOfRange { .. }));
        assert_eq!(form.db_table, "omni");
    }

    #[test]
    fn non_form_commands_are_ignored() {
        assert!(apply(&FormState::default(), &AppCommand::Jobs).is_none());
    }
}

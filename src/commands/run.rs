use crate::app_state::AppEvent;
use crate::form::FormState;
use crate::storage::config_store::{ConfigStore, ConfigStoreError, SavePolicy};
use crate::summary::template::example_strings;
use log::{info, warn};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// "Run"：校验表单并写入归档目录，由 watcher 接手。成功时返回写入的文件路径
pub fn run(
    form: &FormState,
    store: &ConfigStore,
    policy: SavePolicy,
    evt_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Option<PathBuf> {
    // 1. 表单校验
    let config = match form.build_configuration() {
        Ok(c) => c,
        Err(e) => {
            let _ = evt_tx.send(AppEvent::Error(format!("✗ 配置不完整: {}", e)));
            return None;
        }
    };

    // 2. 模板必须能用当前输入完整渲染
    if let Err(e) = example_strings(&form.template, &config) {
        let _ = evt_tx.send(AppEvent::Error(format!("✗ 模板无法渲染: {}", e)));
        return None;
    }

    // 3. 写入
    match store.save_with_policy(&config, policy) {
        Ok(outcome) => {
            info!(
                "saved {} (merged: {})",
                outcome.path.display(),
                outcome.merged
            );
            let verb = if outcome.merged { "已合并并保存" } else { "已保存" };
            let _ = evt_tx.send(AppEvent::Message(format!(
                "✓ 配置{}: {} ({} 个 universe，{} 个模型 key)，等待后台任务启动",
                verb,
                outcome.path.display(),
                outcome.config.universe.len(),
                outcome.config.model_keys.len()
            )));
            Some(outcome.path)
        }
        Err(ConfigStoreError::DuplicateConfiguration(path)) => {
            let _ = evt_tx.send(AppEvent::Error(format!(
                "⚠ 已存在相同环境与表名的配置: {}。使用 `run merge` 合并或 `run overwrite` 覆盖",
                path.display()
            )));
            None
        }
        Err(e) => {
            warn!("save failed: {}", e);
            let _ = evt_tx.send(AppEvent::Error(format!("✗ 保存失败: {}", e)));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::model::ModelSelection;
    use std::collections::BTreeMap;

    fn form() -> FormState {
        FormState::default()
            .with_table("omni")
            .with_universe(vec!["SPX".into()])
            .add_model(ModelSelection::new("RC", vec!["EDI".into()], BTreeMap::new()).unwrap())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(evt) = rx.try_recv() {
            match evt {
                AppEvent::Message(m) | AppEvent::Error(m) | AppEvent::Log(m) => out.push(m),
                _ => {}
            }
        }
        out
    }

    #[test]
    fn second_run_requires_explicit_policy() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(run(&form(), &store, SavePolicy::Reject, &tx).is_some());
        assert!(run(&form(), &store, SavePolicy::Reject, &tx).is_none());
        let msgs = drain(&mut rx);
        assert!(msgs.last().unwrap().contains("run merge"));

        let path = run(&form(), &store, SavePolicy::Merge, &tx).unwrap();
        assert!(path.ends_with("dev_omni_config.json"));
    }

    #[test]
    fn merge_reports_combined_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        run(&form(), &store, SavePolicy::Reject, &tx).unwrap();
        let other = form().with_universe(vec!["FR1".into()]);
        run(&other, &store, SavePolicy::Merge, &tx).unwrap();

        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("1 个 universe"));
        assert!(msgs[1].contains("已合并并保存"));
        assert!(msgs[1].contains("2 个 universe，1 个模型 key"));
    }

    #[test]
    fn incomplete_form_and_bad_template_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(run(&FormState::default(), &store, SavePolicy::Reject, &tx).is_none());
        let bad = form().with_template("{MODEL_KEY}_{REGION}");
        assert!(run(&bad, &store, SavePolicy::Reject, &tx).is_none());

        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("db_table"));
        assert!(msgs[1].contains("REGION"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}

use crate::summary::model::{
    Combination, CombinationStatus, Configuration, FrontierPoint, ModelSelection,
};
use serde_json::Value;

/// implementation × leverage 的笛卡尔积，实现名优先
pub fn generate_model_keys<I, L>(implementations: &[I], leverages: &[L]) -> Vec<String>
where
    I: AsRef<str>,
    L: AsRef<str>,
{
    implementations
        .iter()
        .flat_map(|imp| {
            leverages
                .iter()
                .map(move |lev| format!("{}_{}", imp.as_ref(), lev.as_ref()))
        })
        .collect()
}

pub fn model_keys_for(selections: &[ModelSelection]) -> Vec<String> {
    selections
        .iter()
        .flat_map(|s| generate_model_keys(&[s.implementation.as_str()], &s.leverages))
        .collect()
}

pub fn combination_key(implementation: &str, leverage: &str, frontier: Option<&str>) -> String {
    match frontier {
        Some(f) if !f.is_empty() => format!("{}_{}_{}", implementation, leverage, f),
        _ => format!("{}_{}", implementation, leverage),
    }
}

pub fn combinations_for(
    selections: &[ModelSelection],
    frontier_points: &[FrontierPoint],
) -> Vec<Combination> {
    let mut out = Vec::new();
    for sel in selections {
        for lev in &sel.leverages {
            if frontier_points.is_empty() {
                out.push(Combination {
                    key: combination_key(&sel.implementation, lev, None),
                    implementation: sel.implementation.clone(),
                    leverage: lev.clone(),
                    frontier: None,
                    status: CombinationStatus::Pending,
                });
                continue;
            }
            for point in frontier_points {
                out.push(Combination {
                    key: combination_key(&sel.implementation, lev, Some(&point.key)),
                    implementation: sel.implementation.clone(),
                    leverage: lev.clone(),
                    frontier: Some(point.key.clone()),
                    status: CombinationStatus::Pending,
                });
            }
        }
    }
    out
}

pub fn configuration_combinations(config: &Configuration) -> Vec<Combination> {
    combinations_for(&config.model_configs, &config.frontier_points)
}

/// 侧边栏展示的总组合数：universe 数 × 杠杆总数 × frontier 取值总数
/// 没有 frontier 取值时按 1 计，与调度时每个杠杆一个组合一致
pub fn total_combinations(
    universes: usize,
    selections: &[ModelSelection],
    points: &[FrontierPoint],
) -> usize {
    let leverages: usize = selections.iter().map(|s| s.leverages.len()).sum();
    let values: usize = points.iter().map(|p| p.points.len()).sum();
    universes * leverages * values.max(1)
}

pub fn mark_all(combinations: &mut [Combination], status: CombinationStatus) {
    for c in combinations.iter_mut().filter(|c| !c.status.is_terminal()) {
        c.status = status;
    }
}

/// 结果为 `{组合key: bool}` 形式时逐个更新状态，返回命中数量
pub fn apply_results(combinations: &mut [Combination], results: &Value) -> usize {
    let Value::Object(map) = results else {
        return 0;
    };
    let mut hit = 0;
    for c in combinations.iter_mut() {
        if let Some(ok) = map.get(&c.key).and_then(|v| v.as_bool()) {
            c.status = if ok {
                CombinationStatus::Completed
            } else {
                CombinationStatus::Failed
            };
            hit += 1;
        }
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn selection(imp: &str, levs: &[&str]) -> ModelSelection {
        ModelSelection::new(
            imp,
            levs.iter().map(|s| s.to_string()).collect(),
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn rc_with_two_leverages() {
        assert_eq!(
            generate_model_keys(&["RC"], &["EDI", "AE"]),
            vec!["RC_EDI", "RC_AE"]
        );
    }

    #[test]
    fn key_count_is_product_without_duplicates() {
        let imps = ["RC", "LS", "BLS"];
        let levs = ["EDI", "AE", "AEP", "AEPP"];
        let keys = generate_model_keys(&imps, &levs);
        assert_eq!(keys.len(), imps.len() * levs.len());
        let mut dedup = keys.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), keys.len());
        assert_eq!(keys[0], "RC_EDI");
        assert_eq!(keys[4], "LS_EDI");
    }

    #[test]
    fn empty_axis_yields_no_keys() {
        let none: [&str; 0] = [];
        assert!(generate_model_keys(&none, &["EDI"]).is_empty());
        assert!(generate_model_keys(&["RC"], &none).is_empty());
    }

    #[test]
    fn combinations_cross_frontier_points() {
        let sels = vec![selection("RC", &["EDI", "AE"])];
        let points = vec![
            FrontierPoint {
                key: "SECTOR".into(),
                points: vec!["a".into()],
            },
            FrontierPoint {
                key: "SIZE".into(),
                points: vec!["b".into()],
            },
        ];
        let combos = combinations_for(&sels, &points);
        let keys: Vec<_> = combos.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["RC_EDI_SECTOR", "RC_EDI_SIZE", "RC_AE_SECTOR", "RC_AE_SIZE"]
        );
        assert!(combos.iter().all(|c| c.status == CombinationStatus::Pending));

        let plain = combinations_for(&sels, &[]);
        assert_eq!(plain[1].key, "RC_AE");
        assert_eq!(plain[1].frontier, None);
    }

    #[test]
    fn results_map_drives_statuses() {
        let mut combos = combinations_for(&[selection("LS", &["EDI", "AE"])], &[]);
        mark_all(&mut combos, CombinationStatus::Processing);
        let results = serde_json::json!({"LS_EDI": true, "LS_AE": false});
        let hit = apply_results(&mut combos, &results);
        assert_eq!(hit, 2);
        assert_eq!(combos[0].status, CombinationStatus::Completed);
        assert_eq!(combos[1].status, CombinationStatus::Failed);
    }

    #[test]
    fn total_combinations_multiplies_axes() {
        let sels = vec![selection("RC", &["EDI", "AE"]), selection("LS", &["AEP"])];
        let points = vec![FrontierPoint {
            key: "SECTOR".into(),
            points: vec!["x".into(), "y".into()],
        }];
        assert_eq!(total_combinations(2, &sels, &points), 2 * 3 * 2);
    }

    #[test]
    fn total_without_frontier_counts_each_leverage_once() {
        let sels = vec![selection("RC", &["EDI", "AE"])];
        assert_eq!(total_combinations(1, &sels, &[]), 2);
        assert_eq!(
            total_combinations(1, &sels, &[]),
            combinations_for(&sels, &[]).len()
        );
        assert_eq!(total_combinations(0, &sels, &[]), 0);
    }
}

use crate::summary::model::{Configuration, FrontierPoint};

fn union_into(base: &mut Vec<String>, extra: &[String]) {
    for v in extra {
        if !base.contains(v) {
            base.push(v.clone());
        }
    }
}

/// 按 key 合并 frontier points：同名取值并集，新 key 追加在末尾
pub fn merge_frontier_points(
    existing: &[FrontierPoint],
    incoming: &[FrontierPoint],
) -> Vec<FrontierPoint> {
    let mut merged: Vec<FrontierPoint> = existing.to_vec();
    for point in incoming {
        match merged.iter_mut().find(|p| p.key == point.key) {
            Some(found) => {
                found.absorb(point.points.iter().cloned());
            }
            None => merged.push(point.clone()),
        }
    }
    merged
}

/// 合并同一 (environment, db_table) 下的已有配置与新配置，不修改任何输入。
/// 标量字段（user、年份、版本等）以已有配置为准
pub fn merge_configurations(existing: &Configuration, incoming: &Configuration) -> Configuration {
    let mut merged = existing.clone();

    union_into(&mut merged.universe, &incoming.universe);
    union_into(&mut merged.model_keys, &incoming.model_keys);
    merged
        .model_configs
        .extend(incoming.model_configs.iter().cloned());
    merged.frontier_points =
        merge_frontier_points(&existing.frontier_points, &incoming.frontier_points);

    merged
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entities::{ColumnMapping, LabelingRecord};

/// 将记录的列值按映射转换为外部服务需要的 `{展示名: 值}` 结构
///
/// 空值（null、空白字符串、空数组/对象）以及没有映射的列会被省略。
pub fn build_record_payload(record: &LabelingRecord, mappings: &[ColumnMapping]) -> Map<String, Value> {
    let mut ordered: Vec<&ColumnMapping> = mappings
        .iter()
        .filter(|m| m.dataset_id == record.dataset_id)
        .collect();
    ordered.sort_by_key(|m| m.position);

    let mut payload = Map::new();
    for mapping in ordered {
        let Some(value) = record.columns.get(&mapping.column_name) else {
            continue;
        };
        if is_empty_value(value) {
            continue;
        }
        let value = match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        };
        payload.insert(mapping.display_name.clone(), value);
    }
    payload
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// 批量标注进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_units: i64,
    pub processed_units: i64,
    pub failed_units: i64,
}

impl JobProgress {
    pub fn new(total_units: i64, processed_units: i64, failed_units: i64) -> Self {
        Self {
            total_units,
            processed_units: processed_units.clamp(0, total_units.max(0)),
            failed_units,
        }
    }

    /// 记录一个批次的结果；已处理数不会超过总数
    pub fn advance(&mut self, attempted: i64, failed: i64) {
        self.processed_units = (self.processed_units + attempted).min(self.total_units);
        self.failed_units += failed;
    }

    pub fn is_done(&self) -> bool {
        self.processed_units >= self.total_units
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn record(columns: Value) -> LabelingRecord {
        let columns: BTreeMap<String, Value> = serde_json::from_value(columns).unwrap();
        LabelingRecord {
            id: 1,
            dataset_id: 10,
            taxonomy_id: 3,
            columns,
        }
    }

    fn mapping(column: &str, display: &str, position: i32) -> ColumnMapping {
        ColumnMapping {
            dataset_id: 10,
            column_name: column.to_string(),
            display_name: display.to_string(),
            position,
        }
    }

    #[test]
    fn maps_columns_to_display_names_and_skips_empty() {
        let record = record(json!({
            "col_a": "  Customer complaint about billing ",
            "col_b": "",
            "col_c": null,
            "col_d": 42,
            "unmapped": "ignored"
        }));
        let mappings = vec![
            mapping("col_a", "Comment", 1),
            mapping("col_b", "Channel", 2),
            mapping("col_c", "Region", 3),
            mapping("col_d", "Score", 4),
        ];

        let payload = build_record_payload(&record, &mappings);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["Comment"], json!("Customer complaint about billing"));
        assert_eq!(payload["Score"], json!(42));
        assert!(!payload.contains_key("Channel"));
        assert!(!payload.contains_key("unmapped"));
    }

    #[test]
    fn mappings_of_other_datasets_are_ignored() {
        let record = record(json!({"col_a": "text"}));
        let mut other = mapping("col_a", "Comment", 1);
        other.dataset_id = 99;

        assert!(build_record_payload(&record, &[other]).is_empty());
    }

    #[test]
    fn progress_never_exceeds_total() {
        let mut progress = JobProgress::new(250, 0, 0);
        progress.advance(100, 1);
        progress.advance(100, 0);
        progress.advance(100, 2);
        assert_eq!(progress.processed_units, 250);
        assert_eq!(progress.failed_units, 3);
        assert!(progress.is_done());
    }
}

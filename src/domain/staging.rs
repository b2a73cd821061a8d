// ==========================================
// 财务导入引擎 - 映射规则与暂存记录
// ==========================================
// 用途: 重分类规则（只读）、暂存明细（导入输出单元）、导入批次号
// ==========================================

use crate::domain::types::{MappingStatus, ReportingPeriod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 未映射组合的保留 combo_id
pub const UNMAPPED_COMBO_ID: &str = "UNMAPPED";

// ==========================================
// MappingEntry - 重分类规则
// ==========================================
// 由配置界面维护; 引擎每次导入重新加载, 不跨运行缓存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub config_id: String,
    pub source_account: String,
    pub source_department: Option<String>,
    pub target_account: Option<String>,
    pub target_department: Option<String>,
    pub is_active: bool,
}

impl MappingEntry {
    pub fn new(
        config_id: impl Into<String>,
        source_account: impl Into<String>,
        target_department: Option<&str>,
        target_account: Option<&str>,
    ) -> Self {
        Self {
            config_id: config_id.into(),
            source_account: source_account.into(),
            source_department: None,
            target_account: target_account.map(str::to_string),
            target_department: target_department.map(str::to_string),
            is_active: true,
        }
    }
}

// ==========================================
// StagingRecord - 暂存明细
// ==========================================
// 创建后不再修改; 重新导入时先驱逐再写入新记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingRecord {
    pub combo_id: Option<String>,
    pub period: ReportingPeriod,
    pub scenario: String,
    pub amount: f64,
    pub currency: String,
    pub organizational_unit: String,
    pub target_department: Option<String>,
    pub target_account: Option<String>,
    pub version: String,
    pub source_identifier: String,
    pub source_description: Option<String>,
    pub mapping_status: MappingStatus,
    pub import_batch_id: String,
}

impl StagingRecord {
    pub fn year(&self) -> i32 {
        self.period.year()
    }

    pub fn month(&self) -> u32 {
        self.period.month()
    }

    /// 聚合键: combo_id（或 UNMAPPED）+ "_" + source_identifier
    pub fn aggregation_key(&self) -> String {
        aggregation_key(self.combo_id.as_deref(), &self.source_identifier)
    }
}

pub fn aggregation_key(combo_id: Option<&str>, source_identifier: &str) -> String {
    format!(
        "{}_{}",
        combo_id.unwrap_or(UNMAPPED_COMBO_ID),
        source_identifier
    )
}

// ==========================================
// ImportBatchId - 导入批次号
// ==========================================
// 格式: {processor_id}_{YYYYMMDDHHMMSSmmm}
/// 批次号时间戳部分的字符数
pub const BATCH_TIMESTAMP_LEN: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportBatchId(String);

impl ImportBatchId {
    pub fn new(processor_id: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", processor_id, at.format("%Y%m%d%H%M%S%3f")))
    }

    pub fn generate(processor_id: &str) -> Self {
        Self::new(processor_id, Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 指定处理器生成的批次号字符数（用于在 SQL 中精确识别归属, 避免 "gl" 匹配 "gl_balances"）
    pub fn char_len_for(processor_id: &str) -> usize {
        processor_id.chars().count() + 1 + BATCH_TIMESTAMP_LEN
    }

    pub fn belongs_to(&self, processor_id: &str) -> bool {
        self.0
            .strip_prefix(processor_id)
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for ImportBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_batch_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let id = ImportBatchId::new("gl_balances", at);
        assert_eq!(id.as_str(), "gl_balances_20240305140709000");
        assert!(id.belongs_to("gl_balances"));
        assert!(!id.belongs_to("gl"));
        assert_eq!(ImportBatchId::char_len_for("gl_balances"), id.as_str().len());
    }

    #[test]
    fn test_aggregation_key_uses_sentinel() {
        assert_eq!(aggregation_key(None, "X"), "UNMAPPED_X");
        assert_eq!(aggregation_key(Some("D01_A01"), "X"), "D01_A01_X");
    }
}

// ==========================================
// 财务导入引擎 - 导入 Trait 定义
// ==========================================
// 职责: 定义文件解析与导入处理器接口（不包含实现）
// ==========================================

use crate::domain::{
    ParseOptions, ParsedFile, ParsedRow, ProcessorMetadata, ReportingPeriod, StagingRecord,
};
use crate::importer::error::ImporterResult;
use std::path::Path;

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件为 ParsedFile
    ///
    /// # 返回
    /// - Ok(ParsedFile): 空文件返回 row_count = 0
    /// - Err: FileNotFound / FileReadError / MalformedInput
    fn parse(&self, file_path: &Path, options: &ParseOptions) -> ImporterResult<ParsedFile>;
}

// ==========================================
// 行级抽取结果
// ==========================================

/// 单个 (来源标识, 数值) 度量
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMeasure {
    pub source_identifier: String,
    pub description: Option<String>,
    pub amount: f64,
}

impl ExtractedMeasure {
    /// 来源标识去除首尾空白, 映射查找、聚合键、驱逐集合使用同一形式
    pub fn new(source_identifier: impl Into<String>, amount: f64) -> Self {
        let source_identifier: String = source_identifier.into();
        Self {
            source_identifier: source_identifier.trim().to_string(),
            description: None,
            amount,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// 一行源数据的抽取结果
#[derive(Debug, Clone, PartialEq)]
pub enum RowExtraction {
    /// 一行可产生多个度量（如同一细分市场的客房数与收入）
    Measures(Vec<ExtractedMeasure>),
    /// 缺少分组字段等, 整行跳过并记录日志
    Skip(String),
    /// 行级错误, 按 stop_on_error 处理
    Fail(String),
}

// ==========================================
// 可选行级钩子
// ==========================================
pub type ValidateRowFn = fn(&ParsedRow) -> Result<(), String>;
pub type TransformRowFn = fn(ParsedRow) -> Option<ParsedRow>;

/// 缺省时 validate 恒通过, transform 为恒等
#[derive(Debug, Clone, Copy, Default)]
pub struct RowHooks {
    pub validate_row: Option<ValidateRowFn>,
    /// 返回 None 表示跳过该行（单独计数, 不算失败）
    pub transform_row: Option<TransformRowFn>,
}

impl RowHooks {
    pub fn validate(&self, row: &ParsedRow) -> Result<(), String> {
        match self.validate_row {
            Some(validate) => validate(row),
            None => Ok(()),
        }
    }

    pub fn transform(&self, row: ParsedRow) -> Option<ParsedRow> {
        match self.transform_row {
            Some(transform) => transform(row),
            None => Some(row),
        }
    }
}

/// 结构校验上下文
#[derive(Debug, Clone)]
pub struct StructuralContext {
    pub period: ReportingPeriod,
    pub organizational_unit: String,
    /// config_kv: location_code/{processor_id}
    pub expected_location_code: Option<String>,
}

// ==========================================
// ImportProcessor Trait
// ==========================================
// 用途: 一种导入类型 = 元数据 + 结构校验规则 + 抽取规则
// 实现者: importer::processors 下的各处理器
// 校验/处理流程由 ImportEngine 统一驱动
pub trait ImportProcessor: Send + Sync {
    fn metadata(&self) -> &ProcessorMetadata;

    fn id(&self) -> &str {
        &self.metadata().id
    }

    fn hooks(&self) -> RowHooks {
        RowHooks::default()
    }

    /// 处理器特有的结构校验（缺列检查由引擎完成）
    ///
    /// # 返回
    /// - 违规描述列表; 非空即阻断整个导入
    fn check_structure(&self, _parsed: &ParsedFile, _context: &StructuralContext) -> Vec<String> {
        Vec::new()
    }

    /// 从一行抽取 (来源标识, 数值) 度量
    fn extract(&self, row: &ParsedRow) -> RowExtraction;

    /// 必须始终输出的控制合计（全零文件也输出一条零金额记录）
    fn sentinel(&self) -> Option<ExtractedMeasure> {
        None
    }

    /// 写入完成后的检查, 返回附加提示信息
    fn post_process(&self, _records: &[StagingRecord]) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_totals(row: ParsedRow) -> Option<ParsedRow> {
        match row.get("account") {
            Some(account) if account.starts_with("Total") => None,
            _ => Some(row),
        }
    }

    #[test]
    fn test_default_hooks_are_identity() {
        let hooks = RowHooks::default();
        let mut row = ParsedRow::new();
        row.insert("account".to_string(), "Total".to_string());

        assert!(hooks.validate(&row).is_ok());
        assert_eq!(hooks.transform(row.clone()), Some(row));
    }

    #[test]
    fn test_measure_identifier_is_trimmed() {
        let measure = ExtractedMeasure::new("  Rooms - Corporate \t", 12.0);
        assert_eq!(measure.source_identifier, "Rooms - Corporate");
    }

    #[test]
    fn test_transform_hook_can_skip() {
        let hooks = RowHooks {
            transform_row: Some(drop_totals),
            ..RowHooks::default()
        };
        let mut row = ParsedRow::new();
        row.insert("account".to_string(), "Total Revenue".to_string());
        assert_eq!(hooks.transform(row), None);
    }
}

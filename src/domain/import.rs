// ==========================================
// 财务导入引擎 - 导入契约与结果
// ==========================================
// 用途: 处理器元数据、导入选项、校验结果、导入结果、统一返回信封
// 说明: 所有结果为纯数据, 与传输层无关 (serde camelCase)
// ==========================================

use crate::domain::tabular::ParseOptions;
use crate::domain::types::{FileFormat, ProcessorCategory, ProcessorState, ReportingPeriod};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// ==========================================
// ProcessorMetadata - 处理器元数据
// ==========================================
// 对外暴露给界面渲染, 结构需保持稳定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorMetadata {
    pub id: String,
    pub name: String,
    pub category: ProcessorCategory,
    pub version: String,
    pub supported_formats: Vec<FileFormat>,
    pub required_columns: Vec<String>,
    pub optional_columns: Vec<String>,
    pub validation_rules: Vec<String>,
    pub mapping_config_id: String,
    /// 仅用于跨处理器排序, 不代表并发
    pub processing_order: u32,
}

impl ProcessorMetadata {
    pub fn supports(&self, format: FileFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}

// ==========================================
// ImportOptions - 导入选项
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub period: ReportingPeriod,
    pub organizational_unit: String,
    /// None → 配置 default_scenario
    #[serde(default)]
    pub scenario: Option<String>,
    /// None → 配置 default_version
    #[serde(default)]
    pub version: Option<String>,
    /// None → 组织单元币种, 再退回配置 default_currency
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub skip_validation: bool,
    #[serde(default)]
    pub stop_on_error: bool,
    /// None → 配置 staging_batch_size
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub parse: ParseOptions,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl ImportOptions {
    pub fn new(period: ReportingPeriod, organizational_unit: impl Into<String>) -> Self {
        Self {
            period,
            organizational_unit: organizational_unit.into(),
            scenario: None,
            version: None,
            currency: None,
            skip_validation: false,
            stop_on_error: false,
            batch_size: None,
            parse: ParseOptions::default(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

// ==========================================
// RowError - 行级错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// 数据行号（从 1 开始, 不含表头）
    pub row_number: usize,
    pub message: String,
}

// ==========================================
// ValidationResult - 结构校验结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub processor_id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub missing_required_columns: Vec<String>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl ValidationResult {
    pub fn failed(processor_id: &str, error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            processor_id: processor_id.to_string(),
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

// ==========================================
// ImportResult - 导入结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub processor_id: String,
    pub import_batch_id: Option<String>,
    pub state: ProcessorState,
    pub row_count: usize,
    pub processed_rows: usize,
    pub skipped_rows: usize,
    pub failed_rows: usize,
    pub records_written: usize,
    pub records_evicted: usize,
    pub unmapped_count: usize,
    pub partial_count: usize,
    pub messages: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub validation: Option<ValidationResult>,
    pub elapsed_ms: u64,
}

impl ImportResult {
    pub fn new(processor_id: &str) -> Self {
        Self {
            success: false,
            processor_id: processor_id.to_string(),
            import_batch_id: None,
            state: ProcessorState::Registered,
            row_count: 0,
            processed_rows: 0,
            skipped_rows: 0,
            failed_rows: 0,
            records_written: 0,
            records_evicted: 0,
            unmapped_count: 0,
            partial_count: 0,
            messages: Vec::new(),
            row_errors: Vec::new(),
            validation: None,
            elapsed_ms: 0,
        }
    }
}

// ==========================================
// ExecutionOutcome - 统一返回信封
// ==========================================
// 成功与失败都经由同一结构返回, 调用方无需区分异常与否定结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    pub processor_id: String,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub validation: Option<ValidationResult>,
    pub result: Option<ImportResult>,
}

impl ExecutionOutcome {
    pub fn failure(processor_id: &str, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            processor_id: processor_id.to_string(),
            error: Some(error.into()),
            elapsed_ms,
            validation: None,
            result: None,
        }
    }
}

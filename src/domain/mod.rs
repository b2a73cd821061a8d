// ==========================================
// 财务导入引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、导入契约
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod import;
pub mod staging;
pub mod tabular;
pub mod types;

// 重导出核心类型
pub use import::{
    ExecutionOutcome, ImportOptions, ImportResult, ProcessorMetadata, RowError, ValidationResult,
};
pub use staging::{
    aggregation_key, ImportBatchId, MappingEntry, StagingRecord, UNMAPPED_COMBO_ID,
};
pub use tabular::{ParseOptions, ParsedFile, ParsedRow, SheetSelector};
pub use types::{FileFormat, MappingStatus, ProcessorCategory, ProcessorState, ReportingPeriod};

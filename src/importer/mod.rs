// ==========================================
// 财务导入引擎 - 导入层
// ==========================================
// 职责: 外部财务/统计文件 → 暂存区记录
// 支持: CSV, Excel (.xlsx/.xlsm/.xls)
// 流程: 解析 → 校验 → 映射 → 聚合 → 驱逐 → 写入
// ==========================================

// 模块声明
pub mod engine;
pub mod error;
pub mod field_reader;
pub mod file_parser;
pub mod importer_trait;
pub mod lifecycle;
pub mod mapping_resolver;
pub mod processors;
pub mod registry;
pub mod row_aggregator;
pub mod staging_writer;

// 重导出核心类型
pub use engine::ImportEngine;
pub use error::{ErrorKind, ImportError, ImporterResult};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use lifecycle::ProcessorLifecycle;
pub use mapping_resolver::{MappingResolver, Resolution};
pub use registry::{ExecutionRequest, ImportRegistry};
pub use row_aggregator::{aggregate, AggregationContext, RowAggregator};
pub use staging_writer::{StagingWriter, DEFAULT_BATCH_SIZE};

// 重导出 Trait 接口
pub use importer_trait::{
    ExtractedMeasure, FileParser, ImportProcessor, RowExtraction, RowHooks, StructuralContext,
};

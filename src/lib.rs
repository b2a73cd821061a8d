// ==========================================
// 财务导入引擎 - 核心库
// ==========================================
// 职责: 表格源文件（总账、试算、经营统计）→ 期间化暂存明细
// 技术栈: Rust + SQLite
// 约束: 同一时刻仅一个处理器运行; 重复导入幂等
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    ExecutionOutcome, FileFormat, ImportBatchId, ImportOptions, ImportResult, MappingEntry,
    MappingStatus, ParseOptions, ParsedFile, ProcessorCategory, ProcessorMetadata,
    ProcessorState, ReportingPeriod, StagingRecord, ValidationResult,
};

// 导入层
pub use importer::{
    ExecutionRequest, ImportEngine, ImportError, ImportProcessor, ImportRegistry,
    ImporterResult,
};

// 仓储与配置
pub use config::{ConfigManager, ImportConfigReader};
pub use repository::{StagingGateway, StagingQuery, StagingRepositoryImpl};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "财务导入引擎";

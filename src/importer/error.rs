// ==========================================
// 财务导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误分类（决定传播方式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 文件不存在/不可读/格式不支持: 校验前即终止
    FileError,
    /// 缺列、地点/期间不一致: 阻断处理
    StructuralValidationError,
    /// 单行转换/校验失败: 可恢复
    RowError,
    /// 驱逐/写入失败: 终止剩余流程
    PersistenceError,
    /// 未知处理器、状态机违规、取消等
    EngineError,
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件内容无法解析: {0}")]
    MalformedInput(String),

    // ===== 结构校验错误 =====
    #[error("缺少必需列: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("结构校验失败: {}", .0.join("; "))]
    StructuralValidation(Vec<String>),

    // ===== 行级错误 =====
    #[error("行 {row} 处理失败: {message}")]
    RowError { row: usize, message: String },

    // ===== 持久化错误 =====
    #[error("暂存区写入失败: {0}")]
    Persistence(String),

    // ===== 引擎错误 =====
    #[error("未知处理器: {0}")]
    UnknownProcessor(String),

    #[error("处理器重复注册: {0}")]
    DuplicateProcessor(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("导入已取消")]
    Cancelled,

    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::FileNotFound(_)
            | ImportError::UnsupportedFormat(_)
            | ImportError::FileReadError(_)
            | ImportError::MalformedInput(_) => ErrorKind::FileError,
            ImportError::MissingRequiredColumns(_) | ImportError::StructuralValidation(_) => {
                ErrorKind::StructuralValidationError
            }
            ImportError::RowError { .. } => ErrorKind::RowError,
            ImportError::Persistence(_) => ErrorKind::PersistenceError,
            _ => ErrorKind::EngineError,
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::FileReadError(err.to_string()),
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            return ImportError::FileReadError(err.to_string());
        }
        ImportError::MalformedInput(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::MalformedInput(err.to_string())
    }
}

// 实现 From<RepositoryError>
impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        ImportError::Persistence(err.to_string())
    }
}

/// Result 类型别名
pub type ImporterResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ImportError::FileNotFound("a.csv".into()).kind(),
            ErrorKind::FileError
        );
        assert_eq!(
            ImportError::MissingRequiredColumns(vec!["customer_id".into()]).kind(),
            ErrorKind::StructuralValidationError
        );
        assert_eq!(
            ImportError::from(RepositoryError::LockError("poisoned".into())).kind(),
            ErrorKind::PersistenceError
        );
        assert_eq!(ImportError::Cancelled.kind(), ErrorKind::EngineError);
    }

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = ImportError::MissingRequiredColumns(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "缺少必需列: a, b");
    }
}

// ==========================================
// 财务导入引擎 - 表格解析结果
// ==========================================
// 用途: 文件解码后的行记录与解析选项
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 单行记录: 列名 → 原始值（已 TRIM）
pub type ParsedRow = HashMap<String, String>;

// ==========================================
// ParsedFile - 解析结果
// ==========================================
// 不变量: row_count == rows.len()
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub rows: Vec<ParsedRow>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl ParsedFile {
    pub fn new(columns: Vec<String>, rows: Vec<ParsedRow>) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            columns,
            row_count,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// 返回 required 中缺失的列（保持 required 原顺序）
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .cloned()
            .collect()
    }

    pub fn first_row(&self) -> Option<&ParsedRow> {
        self.rows.first()
    }
}

// ==========================================
// SheetSelector - 工作表选择
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetSelector {
    Name(String),
    Index(usize),
}

// ==========================================
// ParseOptions - 解析选项
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseOptions {
    /// CSV 分隔符覆写（默认 ','）
    pub delimiter: Option<u8>,
    /// 工作表选择（默认第一个）
    pub sheet: Option<SheetSelector>,
    /// 预览用行数上限; 设置后 row_count 只反映实际读取的行数
    pub limit: Option<usize>,
    pub has_headers: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            sheet: None,
            limit: None,
            has_headers: true,
        }
    }
}

impl ParseOptions {
    pub fn preview(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

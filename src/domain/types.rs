// ==========================================
// 财务导入引擎 - 领域类型定义
// ==========================================
// 职责: 映射状态、文件格式、处理器分类、生命周期状态、报告期
// ==========================================

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 映射状态 (Mapping Status)
// ==========================================
// 序列化格式: 小写 (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Mapped,   // 部门与科目均已解析
    Partial,  // 仅解析出其中一个目标字段
    Unmapped, // 规则集中不存在
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Mapped => "mapped",
            MappingStatus::Partial => "partial",
            MappingStatus::Unmapped => "unmapped",
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MappingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mapped" => Ok(MappingStatus::Mapped),
            "partial" => Ok(MappingStatus::Partial),
            "unmapped" => Ok(MappingStatus::Unmapped),
            other => Err(format!("未知映射状态: {}", other)),
        }
    }
}

// ==========================================
// 文件格式 (File Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xlsm,
    Xls,
}

impl FileFormat {
    /// 根据扩展名识别格式（不区分大小写，可带前导 '.'）
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "xlsm" => Some(FileFormat::Xlsm),
            "xls" => Some(FileFormat::Xls),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xlsm => "xlsm",
            FileFormat::Xls => "xls",
        }
    }

    pub fn is_spreadsheet(&self) -> bool {
        !matches!(self, FileFormat::Csv)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

// ==========================================
// 处理器分类 (Processor Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorCategory {
    Financial,  // 金额类（总账余额、试算平衡）
    Statistics, // 统计类（客房数、客人数）
}

impl fmt::Display for ProcessorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorCategory::Financial => write!(f, "FINANCIAL"),
            ProcessorCategory::Statistics => write!(f, "STATISTICS"),
        }
    }
}

// ==========================================
// 处理器生命周期状态 (Processor State)
// ==========================================
// Registered → Validating → {ValidationFailed | Validated}
//            → Processing → {ProcessingFailed | Processed} → PostProcessed
// 显式跳过校验时允许 Registered → Processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorState {
    Registered,
    Validating,
    ValidationFailed,
    Validated,
    Processing,
    ProcessingFailed,
    Processed,
    PostProcessed,
}

impl ProcessorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessorState::ValidationFailed
                | ProcessorState::ProcessingFailed
                | ProcessorState::PostProcessed
        )
    }

    pub fn can_transition_to(&self, next: ProcessorState) -> bool {
        use ProcessorState::*;
        matches!(
            (self, next),
            (Registered, Validating)
                | (Registered, Processing)
                | (Validating, ValidationFailed)
                | (Validating, Validated)
                | (Validated, Processing)
                | (Processing, ProcessingFailed)
                | (Processing, Processed)
                | (Processed, PostProcessed)
        )
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessorState::Registered => "REGISTERED",
            ProcessorState::Validating => "VALIDATING",
            ProcessorState::ValidationFailed => "VALIDATION_FAILED",
            ProcessorState::Validated => "VALIDATED",
            ProcessorState::Processing => "PROCESSING",
            ProcessorState::ProcessingFailed => "PROCESSING_FAILED",
            ProcessorState::Processed => "PROCESSED",
            ProcessorState::PostProcessed => "POST_PROCESSED",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 报告期 (Reporting Period)
// ==========================================
// 序列化格式: "YYYY-MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportingPeriod {
    year: i32,
    month: u32,
}

impl ReportingPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1900..=9999).contains(&year) || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// "YYYY-MM"
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// 解析文件内嵌的期间字段
    ///
    /// 支持: YYYY-MM / YYYY/MM / YYYYMM / MM/YYYY / YYYY-MM-DD / MM/DD/YYYY / YYYY/MM/DD
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
                return Some(Self::from_date(date));
            }
        }

        if value.len() == 6 && value.chars().all(|c| c.is_ascii_digit()) {
            let year = value[..4].parse().ok()?;
            let month = value[4..].parse().ok()?;
            return Self::new(year, month);
        }

        let parts: Vec<&str> = value.split(['-', '/']).map(str::trim).collect();
        if parts.len() != 2 {
            return None;
        }
        let (year, month) = if parts[0].len() == 4 {
            (parts[0], parts[1])
        } else if parts[1].len() == 4 {
            (parts[1], parts[0])
        } else {
            return None;
        };
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("无法识别的报告期: {}", s))
    }
}

impl TryFrom<String> for ReportingPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportingPeriod> for String {
    fn from(period: ReportingPeriod) -> Self {
        period.label()
    }
}

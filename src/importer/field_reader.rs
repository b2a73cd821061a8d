// ==========================================
// 财务导入引擎 - 字段读取工具
// ==========================================
// 职责: 源字段取值 + 类型转换（金额、报告期）
// ==========================================

use crate::domain::{ParsedRow, ReportingPeriod};

/// 提取字符串字段（返回 Option），支持多个可能的列名（别名）
pub fn get_string(row: &ParsedRow, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        row.get(*key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// 解析会计导出中的金额文本
///
/// 支持: 千分位 "1,234.50"、货币符号 "$12"、括号负数 "(45.10)"、尾随负号 "45.10-"
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥' | ' ' | '"'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (body, negate) = if let Some(inner) = cleaned
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
    {
        (inner, true)
    } else if let Some(inner) = cleaned.strip_suffix('-') {
        (inner, true)
    } else {
        (cleaned.as_str(), false)
    };

    // NaN / inf 不是金额
    body.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| if negate { -v } else { v })
}

/// 读取金额字段: 缺失/空白视为 0, 无法解析为错误
pub fn read_amount(row: &ParsedRow, key: &str) -> Result<f64, String> {
    match get_string(row, &[key]) {
        None => Ok(0.0),
        Some(value) => {
            parse_amount(&value).ok_or_else(|| format!("字段 {} 无法解析为数值: {}", key, value))
        }
    }
}

/// 读取报告期字段
pub fn read_period(row: &ParsedRow, key: &str) -> Option<ReportingPeriod> {
    get_string(row, &[key]).and_then(|v| ReportingPeriod::parse(&v))
}

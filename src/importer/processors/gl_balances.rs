// ==========================================
// 财务导入引擎 - 总账余额处理器
// ==========================================
// 来源: 会计系统导出的科目余额表
// 来源标识: 科目代码（account）
// ==========================================

use crate::domain::{FileFormat, ParsedRow, ProcessorCategory, ProcessorMetadata};
use crate::importer::field_reader::{get_string, parse_amount, read_amount};
use crate::importer::importer_trait::{ExtractedMeasure, ImportProcessor, RowExtraction, RowHooks};

pub const PROCESSOR_ID: &str = "gl_balances";

const ACCOUNT: &str = "account";
const AMOUNT: &str = "amount";
const DEPARTMENT: &str = "department";
const DESCRIPTION: &str = "description";

/// 小计行（Total…）跳过; 金额统一规范化为纯数字文本
fn normalize_row(mut row: ParsedRow) -> Option<ParsedRow> {
    let account = row.get(ACCOUNT).map(|v| v.trim()).unwrap_or("");
    if account.to_ascii_lowercase().starts_with("total") {
        return None;
    }
    let normalized = row.get(AMOUNT).and_then(|raw| parse_amount(raw));
    if let Some(amount) = normalized {
        row.insert(AMOUNT.to_string(), amount.to_string());
    }
    Some(row)
}

fn validate_amount(row: &ParsedRow) -> Result<(), String> {
    read_amount(row, AMOUNT).map(|_| ())
}

pub struct GlBalancesProcessor {
    metadata: ProcessorMetadata,
}

impl GlBalancesProcessor {
    pub fn new() -> Self {
        Self {
            metadata: ProcessorMetadata {
                id: PROCESSOR_ID.to_string(),
                name: "总账余额".to_string(),
                category: ProcessorCategory::Financial,
                version: "1.0.0".to_string(),
                supported_formats: vec![
                    FileFormat::Csv,
                    FileFormat::Xlsx,
                    FileFormat::Xlsm,
                    FileFormat::Xls,
                ],
                required_columns: vec![ACCOUNT.to_string(), AMOUNT.to_string()],
                optional_columns: vec![DEPARTMENT.to_string(), DESCRIPTION.to_string()],
                validation_rules: vec![
                    "必须包含 account、amount 列".to_string(),
                    "amount 必须为数值（支持千分位、货币符号、括号负数）".to_string(),
                    "以 Total 开头的小计行不导入".to_string(),
                ],
                mapping_config_id: PROCESSOR_ID.to_string(),
                processing_order: 10,
            },
        }
    }
}

impl Default for GlBalancesProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportProcessor for GlBalancesProcessor {
    fn metadata(&self) -> &ProcessorMetadata {
        &self.metadata
    }

    fn hooks(&self) -> RowHooks {
        RowHooks {
            validate_row: Some(validate_amount),
            transform_row: Some(normalize_row),
        }
    }

    fn extract(&self, row: &ParsedRow) -> RowExtraction {
        let Some(account) = get_string(row, &[ACCOUNT]) else {
            return RowExtraction::Skip("缺少科目代码".to_string());
        };
        match read_amount(row, AMOUNT) {
            Ok(amount) => RowExtraction::Measures(vec![ExtractedMeasure::new(account, amount)
                .with_description(get_string(row, &[DESCRIPTION]))]),
            Err(message) => RowExtraction::Fail(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(account: &str, amount: &str) -> ParsedRow {
        let mut row = ParsedRow::new();
        row.insert(ACCOUNT.to_string(), account.to_string());
        row.insert(AMOUNT.to_string(), amount.to_string());
        row
    }

    #[test]
    fn test_transform_normalizes_amount() {
        let hooks = GlBalancesProcessor::new().hooks();
        let row = hooks.transform(row("4000", "(1,234.50)")).unwrap();
        assert_eq!(row.get(AMOUNT), Some(&"-1234.5".to_string()));
    }

    #[test]
    fn test_transform_skips_total_rows() {
        let hooks = GlBalancesProcessor::new().hooks();
        assert!(hooks.transform(row("Total Revenue", "100")).is_none());
    }

    #[test]
    fn test_validate_rejects_text_amount() {
        let hooks = GlBalancesProcessor::new().hooks();
        assert!(hooks.validate(&row("4000", "abc")).is_err());
        assert!(hooks.validate(&row("4000", "12")).is_ok());
    }

    #[test]
    fn test_extract_uses_account_as_source() {
        let processor = GlBalancesProcessor::new();
        match processor.extract(&row("X", "10")) {
            RowExtraction::Measures(measures) => {
                assert_eq!(measures, vec![ExtractedMeasure::new("X", 10.0)]);
            }
            other => panic!("unexpected extraction: {:?}", other),
        }
        assert!(matches!(processor.extract(&row("", "10")), RowExtraction::Skip(_)));
    }
}

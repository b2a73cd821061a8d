// ==========================================
// 财务导入引擎 - 试算平衡表处理器
// ==========================================
// 来源: 期末试算平衡表（借方/贷方分列）
// 度量: debit - credit
// 控制合计: 始终输出 "TB Out of Balance"（平衡时为 0）
// ==========================================

use crate::domain::{
    FileFormat, ParsedFile, ParsedRow, ProcessorCategory, ProcessorMetadata, StagingRecord,
};
use crate::importer::field_reader::{get_string, read_amount, read_period};
use crate::importer::importer_trait::{
    ExtractedMeasure, ImportProcessor, RowExtraction, StructuralContext,
};

pub const PROCESSOR_ID: &str = "trial_balance";

/// 借贷差额控制标识
pub const OUT_OF_BALANCE_IDENTIFIER: &str = "TB Out of Balance";

/// 低于该差额视为平衡（浮点累加误差）
const BALANCE_TOLERANCE: f64 = 0.005;

const ACCOUNT: &str = "account";
const DEBIT: &str = "debit";
const CREDIT: &str = "credit";
const PERIOD: &str = "period";
const DESCRIPTION: &str = "description";

pub struct TrialBalanceProcessor {
    metadata: ProcessorMetadata,
}

impl TrialBalanceProcessor {
    pub fn new() -> Self {
        Self {
            metadata: ProcessorMetadata {
                id: PROCESSOR_ID.to_string(),
                name: "试算平衡表".to_string(),
                category: ProcessorCategory::Financial,
                version: "1.0.0".to_string(),
                supported_formats: vec![FileFormat::Csv, FileFormat::Xlsx, FileFormat::Xls],
                required_columns: vec![
                    ACCOUNT.to_string(),
                    DEBIT.to_string(),
                    CREDIT.to_string(),
                    PERIOD.to_string(),
                ],
                optional_columns: vec![DESCRIPTION.to_string()],
                validation_rules: vec![
                    "必须包含 account、debit、credit、period 列".to_string(),
                    "首行 period 必须等于所选报告期".to_string(),
                    "借贷不平衡时在结果中提示".to_string(),
                ],
                mapping_config_id: PROCESSOR_ID.to_string(),
                processing_order: 20,
            },
        }
    }
}

impl Default for TrialBalanceProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportProcessor for TrialBalanceProcessor {
    fn metadata(&self) -> &ProcessorMetadata {
        &self.metadata
    }

    fn check_structure(&self, parsed: &ParsedFile, context: &StructuralContext) -> Vec<String> {
        let Some(first) = parsed.first_row() else {
            return Vec::new();
        };
        match read_period(first, PERIOD) {
            Some(period) if period == context.period => Vec::new(),
            Some(period) => vec![format!(
                "文件期间 {} 与所选报告期 {} 不一致",
                period, context.period
            )],
            None => vec![format!(
                "首行期间无法识别: {}",
                first.get(PERIOD).map(String::as_str).unwrap_or("")
            )],
        }
    }

    fn extract(&self, row: &ParsedRow) -> RowExtraction {
        let Some(account) = get_string(row, &[ACCOUNT]) else {
            return RowExtraction::Skip("缺少科目代码".to_string());
        };
        let debit = match read_amount(row, DEBIT) {
            Ok(v) => v,
            Err(message) => return RowExtraction::Fail(message),
        };
        let credit = match read_amount(row, CREDIT) {
            Ok(v) => v,
            Err(message) => return RowExtraction::Fail(message),
        };

        let net = debit - credit;
        RowExtraction::Measures(vec![
            ExtractedMeasure::new(account, net).with_description(get_string(row, &[DESCRIPTION])),
            ExtractedMeasure::new(OUT_OF_BALANCE_IDENTIFIER, net),
        ])
    }

    fn sentinel(&self) -> Option<ExtractedMeasure> {
        Some(ExtractedMeasure::new(OUT_OF_BALANCE_IDENTIFIER, 0.0))
    }

    fn post_process(&self, records: &[StagingRecord]) -> Vec<String> {
        let difference: f64 = records
            .iter()
            .filter(|r| r.source_identifier == OUT_OF_BALANCE_IDENTIFIER)
            .map(|r| r.amount)
            .sum();
        if difference.abs() > BALANCE_TOLERANCE {
            vec![format!("试算不平衡: 借贷差额 {:.2}", difference)]
        } else {
            Vec::new()
        }
    }
}

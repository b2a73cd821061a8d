// ==========================================
// 财务导入引擎 - 酒店经营统计处理器
// ==========================================
// 来源: PMS 导出的细分市场统计表（每行一个细分市场）
// 来源标识: 复合键 "Rooms - X" / "Revenue - X" / "Guests - X"
// 结构校验: 首行 location 必须等于配置的地点代码
// ==========================================

use crate::domain::{FileFormat, ParsedFile, ParsedRow, ProcessorCategory, ProcessorMetadata};
use crate::importer::field_reader::{get_string, read_amount};
use crate::importer::importer_trait::{
    ExtractedMeasure, ImportProcessor, RowExtraction, StructuralContext,
};

pub const PROCESSOR_ID: &str = "hotel_statistics";

const SEGMENT: &str = "segment";
const ROOMS: &str = "rooms";
const REVENUE: &str = "revenue";
const GUESTS: &str = "guests";
const LOCATION: &str = "location";

/// (列名, 来源标识前缀)
const MEASURES: [(&str, &str); 3] = [(ROOMS, "Rooms"), (REVENUE, "Revenue"), (GUESTS, "Guests")];

pub fn composite_identifier(prefix: &str, segment: &str) -> String {
    format!("{} - {}", prefix, segment)
}

pub struct HotelStatisticsProcessor {
    metadata: ProcessorMetadata,
}

impl HotelStatisticsProcessor {
    pub fn new() -> Self {
        Self {
            metadata: ProcessorMetadata {
                id: PROCESSOR_ID.to_string(),
                name: "酒店经营统计".to_string(),
                category: ProcessorCategory::Statistics,
                version: "1.0.0".to_string(),
                supported_formats: vec![FileFormat::Csv, FileFormat::Xlsx, FileFormat::Xls],
                required_columns: vec![SEGMENT.to_string(), ROOMS.to_string(), REVENUE.to_string()],
                optional_columns: vec![GUESTS.to_string(), LOCATION.to_string()],
                validation_rules: vec![
                    "必须包含 segment、rooms、revenue 列".to_string(),
                    "已配置地点代码时, 首行 location 必须与之一致".to_string(),
                    "缺少细分市场名称的行跳过".to_string(),
                ],
                mapping_config_id: PROCESSOR_ID.to_string(),
                processing_order: 30,
            },
        }
    }
}

impl Default for HotelStatisticsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportProcessor for HotelStatisticsProcessor {
    fn metadata(&self) -> &ProcessorMetadata {
        &self.metadata
    }

    fn check_structure(&self, parsed: &ParsedFile, context: &StructuralContext) -> Vec<String> {
        let Some(expected) = context.expected_location_code.as_deref() else {
            return Vec::new();
        };
        let Some(first) = parsed.first_row() else {
            return Vec::new();
        };

        match get_string(first, &[LOCATION]) {
            Some(actual) if actual.eq_ignore_ascii_case(expected.trim()) => Vec::new(),
            Some(actual) => vec![format!(
                "地点代码不一致: 文件为 {}, 期望 {}",
                actual, expected
            )],
            None => vec![format!("首行缺少地点代码, 期望 {}", expected)],
        }
    }

    fn extract(&self, row: &ParsedRow) -> RowExtraction {
        let Some(segment) = get_string(row, &[SEGMENT]) else {
            return RowExtraction::Skip("缺少细分市场名称".to_string());
        };

        let mut measures = Vec::with_capacity(MEASURES.len());
        for (column, prefix) in MEASURES {
            match read_amount(row, column) {
                Ok(value) => measures.push(
                    ExtractedMeasure::new(composite_identifier(prefix, &segment), value)
                        .with_description(Some(segment.clone())),
                ),
                Err(message) => return RowExtraction::Fail(message),
            }
        }
        RowExtraction::Measures(measures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReportingPeriod;

    fn row(pairs: &[(&str, &str)]) -> ParsedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn context(expected: Option<&str>) -> StructuralContext {
        StructuralContext {
            period: ReportingPeriod::new(2024, 5).unwrap(),
            organizational_unit: "HOTEL01".to_string(),
            expected_location_code: expected.map(str::to_string),
        }
    }

    #[test]
    fn test_one_row_yields_composite_measures() {
        let processor = HotelStatisticsProcessor::new();
        let r = row(&[(SEGMENT, "Corporate"), (ROOMS, "12"), (REVENUE, "1,500"), (GUESTS, "")]);
        let RowExtraction::Measures(measures) = processor.extract(&r) else {
            panic!("expected measures");
        };
        let ids: Vec<_> = measures.iter().map(|m| m.source_identifier.as_str()).collect();
        assert_eq!(ids, vec!["Rooms - Corporate", "Revenue - Corporate", "Guests - Corporate"]);
        assert_eq!(measures[1].amount, 1500.0);
        assert_eq!(measures[2].amount, 0.0);
    }

    #[test]
    fn test_missing_segment_is_skipped() {
        let processor = HotelStatisticsProcessor::new();
        let r = row(&[(SEGMENT, " "), (ROOMS, "1"), (REVENUE, "1")]);
        assert!(matches!(processor.extract(&r), RowExtraction::Skip(_)));
    }

    #[test]
    fn test_location_mismatch_is_structural_error() {
        let processor = HotelStatisticsProcessor::new();
        let parsed = ParsedFile::new(
            vec![SEGMENT.into(), ROOMS.into(), REVENUE.into(), LOCATION.into()],
            vec![row(&[(SEGMENT, "A"), (ROOMS, "1"), (REVENUE, "1"), (LOCATION, "NYC01")])],
        );

        assert!(processor.check_structure(&parsed, &context(None)).is_empty());
        assert!(processor.check_structure(&parsed, &context(Some("nyc01"))).is_empty());
        assert_eq!(processor.check_structure(&parsed, &context(Some("LAX02"))).len(), 1);
    }
}

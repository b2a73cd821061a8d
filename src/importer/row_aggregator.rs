// ==========================================
// 财务导入引擎 - 行聚合器
// ==========================================
// 职责: (来源标识, 数值) → 解析映射 → 按聚合键累加 → 暂存候选记录
// 聚合键: combo_id（或 UNMAPPED）+ "_" + source_identifier
// 说明: 零值度量直接丢弃; 金额按浮点累加, 不做币种精度舍入
// ==========================================

use crate::domain::{aggregation_key, MappingStatus, ReportingPeriod, StagingRecord};
use crate::importer::importer_trait::ExtractedMeasure;
use crate::importer::mapping_resolver::MappingResolver;
use std::collections::HashMap;

/// 调用方提供的候选记录上下文
#[derive(Debug, Clone)]
pub struct AggregationContext {
    pub period: ReportingPeriod,
    pub scenario: String,
    pub currency: String,
    pub organizational_unit: String,
    pub version: String,
    pub import_batch_id: String,
}

// ==========================================
// RowAggregator
// ==========================================
// 候选记录按首次出现顺序输出
pub struct RowAggregator<'a> {
    resolver: &'a MappingResolver,
    context: &'a AggregationContext,
    index: HashMap<String, usize>,
    candidates: Vec<StagingRecord>,
}

impl<'a> RowAggregator<'a> {
    pub fn new(resolver: &'a MappingResolver, context: &'a AggregationContext) -> Self {
        Self {
            resolver,
            context,
            index: HashMap::new(),
            candidates: Vec::new(),
        }
    }

    /// 累加一个度量
    ///
    /// # 返回
    /// - true: 已计入候选; false: 零值被丢弃
    pub fn add(&mut self, measure: &ExtractedMeasure) -> bool {
        if measure.amount == 0.0 {
            return false;
        }
        self.accumulate(measure);
        true
    }

    /// 确保控制合计标识至少有一条记录（金额可为零）
    pub fn ensure_sentinel(&mut self, sentinel: &ExtractedMeasure) {
        self.accumulate(sentinel);
    }

    fn accumulate(&mut self, measure: &ExtractedMeasure) {
        let resolution = self.resolver.resolve(&measure.source_identifier);
        let key = aggregation_key(resolution.combo_id.as_deref(), &measure.source_identifier);

        if let Some(&idx) = self.index.get(&key) {
            let candidate = &mut self.candidates[idx];
            candidate.amount += measure.amount;
            if candidate.source_description.is_none() {
                candidate.source_description = measure.description.clone();
            }
            return;
        }

        let ctx = self.context;
        self.index.insert(key, self.candidates.len());
        self.candidates.push(StagingRecord {
            combo_id: resolution.combo_id,
            period: ctx.period,
            scenario: ctx.scenario.clone(),
            amount: measure.amount,
            currency: ctx.currency.clone(),
            organizational_unit: ctx.organizational_unit.clone(),
            target_department: resolution.target_department,
            target_account: resolution.target_account,
            version: ctx.version.clone(),
            source_identifier: measure.source_identifier.clone(),
            source_description: measure.description.clone(),
            mapping_status: resolution.status,
            import_batch_id: ctx.import_batch_id.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn count_by_status(&self, status: MappingStatus) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.mapping_status == status)
            .count()
    }

    pub fn into_candidates(self) -> Vec<StagingRecord> {
        self.candidates
    }
}

/// 对一组度量做一次性聚合
pub fn aggregate<'m, I>(
    measures: I,
    resolver: &MappingResolver,
    context: &AggregationContext,
) -> Vec<StagingRecord>
where
    I: IntoIterator<Item = &'m ExtractedMeasure>,
{
    let mut aggregator = RowAggregator::new(resolver, context);
    for measure in measures {
        aggregator.add(measure);
    }
    aggregator.into_candidates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MappingEntry, UNMAPPED_COMBO_ID};

    fn context() -> AggregationContext {
        AggregationContext {
            period: ReportingPeriod::new(2024, 3).unwrap(),
            scenario: "Actual".to_string(),
            currency: "USD".to_string(),
            organizational_unit: "HOTEL01".to_string(),
            version: "v1".to_string(),
            import_batch_id: "gl_balances_20240301000000000".to_string(),
        }
    }

    fn resolver() -> MappingResolver {
        MappingResolver::from_entries(
            "gl_balances",
            vec![
                MappingEntry::new("gl_balances", "X", Some("D01"), Some("A01")),
                MappingEntry::new("gl_balances", "Y", Some("D01"), Some("A01")),
            ],
        )
    }

    #[test]
    fn test_sum_and_drop_zero() {
        let measures = vec![
            ExtractedMeasure::new("X", 10.0),
            ExtractedMeasure::new("X", -3.0),
            ExtractedMeasure::new("X", 0.0),
        ];
        let ctx = context();
        let candidates = aggregate(&measures, &resolver(), &ctx);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].combo_id.as_deref(), Some("D01_A01"));
        assert_eq!(candidates[0].amount, 7.0);
        assert_eq!(candidates[0].mapping_status, MappingStatus::Mapped);
        assert_eq!(candidates[0].organizational_unit, "HOTEL01");
    }

    #[test]
    fn test_same_combo_different_source_stays_separate() {
        let measures = vec![ExtractedMeasure::new("X", 1.0), ExtractedMeasure::new("Y", 2.0)];
        let ctx = context();
        let candidates = aggregate(&measures, &resolver(), &ctx);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_identifier, "X");
        assert_eq!(candidates[1].source_identifier, "Y");
    }

    #[test]
    fn test_padded_identifiers_share_one_key() {
        let measures = vec![ExtractedMeasure::new("X", 4.0), ExtractedMeasure::new(" X ", 6.0)];
        let ctx = context();
        let candidates = aggregate(&measures, &resolver(), &ctx);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_identifier, "X");
        assert_eq!(candidates[0].amount, 10.0);
    }

    #[test]
    fn test_unmapped_uses_sentinel_combo() {
        let measures = vec![ExtractedMeasure::new("Z", 5.0), ExtractedMeasure::new("Z", 5.0)];
        let ctx = context();
        let candidates = aggregate(&measures, &resolver(), &ctx);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].combo_id.as_deref(), Some(UNMAPPED_COMBO_ID));
        assert_eq!(candidates[0].amount, 10.0);
    }

    #[test]
    fn test_all_zero_yields_nothing_unless_sentinel() {
        let ctx = context();
        let r = resolver();
        let mut aggregator = RowAggregator::new(&r, &ctx);
        assert!(!aggregator.add(&ExtractedMeasure::new("X", 0.0)));
        assert!(aggregator.is_empty());

        aggregator.ensure_sentinel(&ExtractedMeasure::new("TB Out of Balance", 0.0));
        let candidates = aggregator.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].amount, 0.0);
    }
}

// ==========================================
// 财务导入引擎 - 暂存区写入器
// ==========================================
// 职责: 驱逐本处理器规则来源标识下的旧暂存记录, 驱逐本处理器自有的未映射记录, 分批写入新候选记录
// 顺序: 驱逐完成后才开始任何一批写入（由调用顺序保证, 不跨事务）
// 失败: 中途失败整体报错, 已提交批次不回滚
// ==========================================

use crate::domain::StagingRecord;
use crate::importer::error::{ImportError, ImporterResult};
use crate::repository::StagingGateway;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 默认每批写入条数
pub const DEFAULT_BATCH_SIZE: usize = 100;

pub struct StagingWriter<'a, G>
where
    G: StagingGateway + ?Sized,
{
    gateway: &'a G,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, G> StagingWriter<'a, G>
where
    G: StagingGateway + ?Sized,
{
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<&'a CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> ImporterResult<()> {
        if self.cancel.is_some_and(|t| t.is_cancelled()) {
            return Err(ImportError::Cancelled);
        }
        Ok(())
    }

    /// 删除 source_identifier 属于给定集合的暂存记录
    ///
    /// # 返回
    /// - Ok(usize): 删除的记录数（集合为空时不访问数据库）
    pub async fn evict_matching(&self, source_identifiers: &[String]) -> ImporterResult<usize> {
        if source_identifiers.is_empty() {
            debug!("驱逐集合为空, 跳过");
            return Ok(0);
        }
        self.check_cancelled()?;

        let deleted = self
            .gateway
            .delete_staging_where_source_in(source_identifiers)
            .await?;
        info!(
            identifiers = source_identifiers.len(),
            deleted = deleted,
            "旧暂存记录驱逐完成"
        );
        Ok(deleted)
    }

    /// 删除本处理器此前写入、且来源标识属于给定集合的暂存记录
    ///
    /// 用于不在规则集内的来源标识（未映射记录）, 其他处理器同名来源标识的记录保持不变
    pub async fn evict_owned(
        &self,
        source_identifiers: &[String],
        processor_id: &str,
    ) -> ImporterResult<usize> {
        if source_identifiers.is_empty() {
            return Ok(0);
        }
        self.check_cancelled()?;

        let deleted = self
            .gateway
            .delete_staging_where_source_in_for_processor(source_identifiers, processor_id)
            .await?;
        debug!(
            identifiers = source_identifiers.len(),
            deleted = deleted,
            processor_id = processor_id,
            "本处理器旧记录驱逐完成"
        );
        Ok(deleted)
    }

    /// 分批顺序写入候选记录
    ///
    /// # 参数
    /// - candidates: 聚合后的候选记录
    /// - batch_size: 每批条数; 0 视为默认值
    ///
    /// # 返回
    /// - Ok(usize): 写入总数
    /// - Err(Cancelled): 批次之间检测到取消, 已写入批次保留
    pub async fn write_batch(
        &self,
        candidates: &[StagingRecord],
        batch_size: usize,
    ) -> ImporterResult<usize> {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };

        let mut written = 0usize;
        for (chunk_idx, chunk) in candidates.chunks(batch_size).enumerate() {
            if let Err(err) = self.check_cancelled() {
                warn!(written = written, total = candidates.len(), "写入过程中被取消");
                return Err(err);
            }
            written += self.gateway.insert_staging_batch(chunk).await?;
            debug!(chunk = chunk_idx + 1, written = written, "暂存批次写入完成");
        }

        info!(written = written, batch_size = batch_size, "暂存记录写入完成");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MappingEntry, MappingStatus, ReportingPeriod};
    use crate::repository::RepositoryResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<String>>,
        chunk_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl StagingGateway for RecordingGateway {
        async fn delete_staging_where_source_in(
            &self,
            source_identifiers: &[String],
        ) -> RepositoryResult<usize> {
            self.calls.lock().unwrap().push("delete".to_string());
            Ok(source_identifiers.len())
        }

        async fn delete_staging_where_source_in_for_processor(
            &self,
            source_identifiers: &[String],
            processor_id: &str,
        ) -> RepositoryResult<usize> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete_owned:{}", processor_id));
            Ok(source_identifiers.len())
        }

        async fn insert_staging_batch(&self, records: &[StagingRecord]) -> RepositoryResult<usize> {
            self.calls.lock().unwrap().push("insert".to_string());
            self.chunk_sizes.lock().unwrap().push(records.len());
            Ok(records.len())
        }

        async fn get_mapping_rules(&self, _config_id: &str) -> RepositoryResult<Vec<MappingEntry>> {
            Ok(Vec::new())
        }

        async fn get_organizational_unit_currency(
            &self,
            _organizational_unit: &str,
        ) -> RepositoryResult<Option<String>> {
            Ok(None)
        }
    }

    fn record(source: &str) -> StagingRecord {
        StagingRecord {
            combo_id: Some("D01_A01".to_string()),
            period: ReportingPeriod::new(2024, 1).unwrap(),
            scenario: "Actual".to_string(),
            amount: 1.0,
            currency: "USD".to_string(),
            organizational_unit: "HOTEL01".to_string(),
            target_department: Some("D01".to_string()),
            target_account: Some("A01".to_string()),
            version: "v1".to_string(),
            source_identifier: source.to_string(),
            source_description: None,
            mapping_status: MappingStatus::Mapped,
            import_batch_id: "gl_balances_20240101000000000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_batch_chunks() {
        let gateway = RecordingGateway::default();
        let writer = StagingWriter::new(&gateway);
        let candidates: Vec<_> = (0..5).map(|i| record(&i.to_string())).collect();

        let written = writer.write_batch(&candidates, 2).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(*gateway.chunk_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_uses_default() {
        let gateway = RecordingGateway::default();
        let writer = StagingWriter::new(&gateway);
        let candidates: Vec<_> = (0..150).map(|i| record(&i.to_string())).collect();

        writer.write_batch(&candidates, 0).await.unwrap();
        assert_eq!(*gateway.chunk_sizes.lock().unwrap(), vec![100, 50]);
    }

    #[tokio::test]
    async fn test_evict_empty_set_skips_gateway() {
        let gateway = RecordingGateway::default();
        let writer = StagingWriter::new(&gateway);
        assert_eq!(writer.evict_matching(&[]).await.unwrap(), 0);
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evict_owned_passes_processor_id() {
        let gateway = RecordingGateway::default();
        let writer = StagingWriter::new(&gateway);
        assert_eq!(writer.evict_owned(&[], "gl_balances").await.unwrap(), 0);

        let deleted = writer
            .evict_owned(&["ORPHAN".to_string()], "gl_balances")
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(*gateway.calls.lock().unwrap(), vec!["delete_owned:gl_balances"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_chunk() {
        let gateway = RecordingGateway::default();
        let token = CancellationToken::new();
        token.cancel();
        let writer = StagingWriter::new(&gateway).with_cancel(Some(&token));

        let result = writer.write_batch(&[record("X")], 10).await;
        assert!(matches!(result, Err(ImportError::Cancelled)));
        assert!(gateway.chunk_sizes.lock().unwrap().is_empty());
    }
}

// ==========================================
// 财务导入引擎 - 暂存区持久化网关 Trait
// ==========================================
// 职责: 定义引擎调用的数据访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::{MappingEntry, StagingRecord};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// StagingGateway Trait
// ==========================================
// 用途: 引擎与持久层之间唯一的接缝
// 实现者: StagingRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait StagingGateway: Send + Sync {
    /// 删除 source_identifier 属于给定集合的暂存记录
    ///
    /// # 返回
    /// - Ok(usize): 删除的记录数
    async fn delete_staging_where_source_in(
        &self,
        source_identifiers: &[String],
    ) -> RepositoryResult<usize>;

    /// 删除 source_identifier 属于给定集合且由指定处理器写入的暂存记录
    ///
    /// 归属由 import_batch_id（{processor_id}_{时间戳}）判定, 其他处理器的记录不受影响
    ///
    /// # 返回
    /// - Ok(usize): 删除的记录数
    async fn delete_staging_where_source_in_for_processor(
        &self,
        source_identifiers: &[String],
        processor_id: &str,
    ) -> RepositoryResult<usize>;

    /// 批量插入暂存记录（单批一个事务）
    ///
    /// # 返回
    /// - Ok(usize): 插入的记录数
    /// - Err: 数据库错误（本批回滚，之前的批次保持已提交）
    async fn insert_staging_batch(&self, records: &[StagingRecord]) -> RepositoryResult<usize>;

    /// 读取指定映射配置下的全部规则（含未启用规则，过滤由调用方负责）
    ///
    /// 返回顺序即加载顺序，同一来源标识的后加载规则覆盖先加载规则
    async fn get_mapping_rules(&self, config_id: &str) -> RepositoryResult<Vec<MappingEntry>>;

    /// 读取组织单元币种
    ///
    /// # 返回
    /// - Ok(None): 组织单元不存在或未配置币种
    async fn get_organizational_unit_currency(
        &self,
        organizational_unit: &str,
    ) -> RepositoryResult<Option<String>>;
}

// ==========================================
// 财务导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 暂存写入分批大小
    ///
    /// # 默认值
    /// - 100
    async fn get_staging_batch_size(&self) -> RepositoryResult<usize>;

    /// 组织单元未配置币种时使用的默认币种
    ///
    /// # 默认值
    /// - USD
    async fn get_default_currency(&self) -> RepositoryResult<String>;

    /// 默认场景
    ///
    /// # 默认值
    /// - Actual
    async fn get_default_scenario(&self) -> RepositoryResult<String>;

    /// 默认版本
    ///
    /// # 默认值
    /// - v1
    async fn get_default_version(&self) -> RepositoryResult<String>;

    /// 处理器期望的地点代码（结构校验用）
    ///
    /// # 返回
    /// - None: 未配置, 跳过该项校验
    async fn get_expected_location_code(
        &self,
        processor_id: &str,
    ) -> RepositoryResult<Option<String>>;

    /// 处理器映射配置 ID 覆写
    ///
    /// # 返回
    /// - None: 使用处理器元数据中的 mapping_config_id
    async fn get_mapping_config_override(
        &self,
        processor_id: &str,
    ) -> RepositoryResult<Option<String>>;
}

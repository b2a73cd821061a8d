// ==========================================
// 财务导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 配置键
pub mod config_keys {
    pub const STAGING_BATCH_SIZE: &str = "staging_batch_size";
    pub const DEFAULT_CURRENCY: &str = "default_currency";
    pub const DEFAULT_SCENARIO: &str = "default_scenario";
    pub const DEFAULT_VERSION: &str = "default_version";

    /// location_code/{processor_id}
    pub fn location_code(processor_id: &str) -> String {
        format!("location_code/{}", processor_id)
    }

    /// mapping_config/{processor_id}
    pub fn mapping_config(processor_id: &str) -> String {
        format!("mapping_config/{}", processor_id)
    }
}

pub const DEFAULT_STAGING_BATCH_SIZE: usize = 100;
pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_SCENARIO: &str = "Actual";
pub const DEFAULT_VERSION: &str = "v1";

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn.lock()?;
            configure_sqlite_connection(&guard)?;
            ensure_schema(&guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.conn.lock()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.conn.lock()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::InternalError(e.to_string()))
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_staging_batch_size(&self) -> RepositoryResult<usize> {
        let raw = self.get_config_value(config_keys::STAGING_BATCH_SIZE)?;
        match raw {
            None => Ok(DEFAULT_STAGING_BATCH_SIZE),
            Some(value) => match value.parse::<usize>() {
                Ok(size) if size > 0 => Ok(size),
                _ => Err(RepositoryError::FieldValueError {
                    field: config_keys::STAGING_BATCH_SIZE.to_string(),
                    message: format!("需要正整数, 实际: {}", value),
                }),
            },
        }
    }

    async fn get_default_currency(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::DEFAULT_CURRENCY, DEFAULT_CURRENCY)
    }

    async fn get_default_scenario(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::DEFAULT_SCENARIO, DEFAULT_SCENARIO)
    }

    async fn get_default_version(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::DEFAULT_VERSION, DEFAULT_VERSION)
    }

    async fn get_expected_location_code(
        &self,
        processor_id: &str,
    ) -> RepositoryResult<Option<String>> {
        self.get_config_value(&config_keys::location_code(processor_id))
    }

    async fn get_mapping_config_override(
        &self,
        processor_id: &str,
    ) -> RepositoryResult<Option<String>> {
        self.get_config_value(&config_keys::mapping_config(processor_id))
    }
}

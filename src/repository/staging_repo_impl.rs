// ==========================================
// 财务导入引擎 - 暂存区 Repository 实现
// ==========================================
// 职责: 实现 StagingGateway（使用 rusqlite）+ 管理/查询辅助方法
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use crate::domain::{ImportBatchId, MappingEntry, MappingStatus, ReportingPeriod, StagingRecord};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::staging_repo::StagingGateway;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 单条 DELETE 语句中 IN (...) 的最大参数个数
const DELETE_CHUNK_SIZE: usize = 500;

// ==========================================
// StagingQuery - 暂存区查询条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StagingQuery {
    pub organizational_unit: Option<String>,
    pub period: Option<ReportingPeriod>,
    pub import_batch_id: Option<String>,
    pub source_identifier: Option<String>,
    pub mapping_status: Option<MappingStatus>,
}

impl StagingQuery {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(ou) = &self.organizational_unit {
            clauses.push("organizational_unit = ?");
            values.push(ou.clone());
        }
        if let Some(period) = &self.period {
            clauses.push("period = ?");
            values.push(period.label());
        }
        if let Some(batch_id) = &self.import_batch_id {
            clauses.push("import_batch_id = ?");
            values.push(batch_id.clone());
        }
        if let Some(source) = &self.source_identifier {
            clauses.push("source_identifier = ?");
            values.push(source.clone());
        }
        if let Some(status) = &self.mapping_status {
            clauses.push("mapping_status = ?");
            values.push(status.as_str().to_string());
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

// ==========================================
// StagingRepositoryImpl
// ==========================================
pub struct StagingRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl StagingRepositoryImpl {
    /// 创建新的 Repository 实例（建表幂等）
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

    /// 从已有连接创建（会再次应用统一 PRAGMA 与建表，均为幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn.lock()?;
            configure_sqlite_connection(&guard)?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    // ===== 规则与组织单元维护（供配置工具与测试使用）=====

    /// 追加一条映射规则, 返回 rule_id
    pub fn insert_mapping_rule(&self, entry: &MappingEntry) -> RepositoryResult<i64> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT INTO mapping_rule (
                config_id, source_account, source_department,
                target_account, target_department, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.config_id,
                entry.source_account,
                entry.source_department,
                entry.target_account,
                entry.target_department,
                entry.is_active as i32,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_mapping_rule_active(&self, rule_id: i64, active: bool) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        let updated = conn.execute(
            "UPDATE mapping_rule SET is_active = ?1, updated_at = datetime('now') WHERE rule_id = ?2",
            params![active as i32, rule_id],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "mapping_rule".to_string(),
                id: rule_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn upsert_organizational_unit(
        &self,
        ou_id: &str,
        name: Option<&str>,
        currency: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT INTO organizational_unit (ou_id, name, currency) VALUES (?1, ?2, ?3)
            ON CONFLICT(ou_id) DO UPDATE SET
                name = excluded.name,
                currency = excluded.currency
            "#,
            params![ou_id, name, currency],
        )?;
        Ok(())
    }

    // ===== 暂存区查询 =====

    pub fn list_staging_records(&self, query: &StagingQuery) -> RepositoryResult<Vec<StagingRecord>> {
        let conn = self.conn.lock()?;
        let (where_sql, values) = query.where_clause();
        let sql = format!(
            r#"
            SELECT combo_id, period, scenario, amount, currency, organizational_unit,
                   target_department, target_account, version, source_identifier,
                   source_description, mapping_status, import_batch_id
            FROM staging_record
            {}
            ORDER BY source_identifier, combo_id
            "#,
            where_sql
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), map_staging_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// 按 combo_id 汇总金额（partial 记录 combo_id 为空，不参与汇总）
    pub fn sum_amount_by_combo(&self, query: &StagingQuery) -> RepositoryResult<Vec<(String, f64)>> {
        let conn = self.conn.lock()?;
        let (where_sql, values) = query.where_clause();
        let combo_filter = if where_sql.is_empty() {
            "WHERE combo_id IS NOT NULL".to_string()
        } else {
            format!("{} AND combo_id IS NOT NULL", where_sql)
        };
        let sql = format!(
            "SELECT combo_id, SUM(amount) FROM staging_record {} GROUP BY combo_id ORDER BY combo_id",
            combo_filter
        );

        let mut stmt = conn.prepare(&sql)?;
        let totals = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    pub fn count_staging_records(&self) -> RepositoryResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM staging_record", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 按导入批次删除（人工撤销某次导入）
    pub fn delete_staging_by_batch(&self, import_batch_id: &str) -> RepositoryResult<usize> {
        let conn = self.conn.lock()?;
        let deleted = conn.execute(
            "DELETE FROM staging_record WHERE import_batch_id = ?1",
            params![import_batch_id],
        )?;
        Ok(deleted)
    }
}

#[async_trait]
impl StagingGateway for StagingRepositoryImpl {
    /// 分块执行 DELETE ... IN (...)，整体一个事务
    async fn delete_staging_where_source_in(
        &self,
        source_identifiers: &[String],
    ) -> RepositoryResult<usize> {
        if source_identifiers.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut deleted = 0;
        for chunk in source_identifiers.chunks(DELETE_CHUNK_SIZE) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "DELETE FROM staging_record WHERE source_identifier IN ({})",
                placeholders
            );
            deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    /// 同上, 额外按批次号归属过滤（长度 + 前缀精确匹配）
    async fn delete_staging_where_source_in_for_processor(
        &self,
        source_identifiers: &[String],
        processor_id: &str,
    ) -> RepositoryResult<usize> {
        if source_identifiers.is_empty() {
            return Ok(0);
        }

        let prefix = format!("{}_", processor_id);
        let prefix_len = prefix.chars().count() as i64;
        let batch_len = ImportBatchId::char_len_for(processor_id) as i64;

        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut deleted = 0;
        for chunk in source_identifiers.chunks(DELETE_CHUNK_SIZE) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "DELETE FROM staging_record \
                 WHERE source_identifier IN ({}) \
                   AND length(import_batch_id) = ? \
                   AND substr(import_batch_id, 1, ?) = ?",
                placeholders
            );
            let mut values: Vec<Value> = chunk.iter().cloned().map(Value::Text).collect();
            values.push(Value::Integer(batch_len));
            values.push(Value::Integer(prefix_len));
            values.push(Value::Text(prefix.clone()));
            deleted += tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    async fn insert_staging_batch(&self, records: &[StagingRecord]) -> RepositoryResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;
        let created_at = Utc::now().to_rfc3339();

        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO staging_record (
                    staging_id, combo_id, period_year, period_month, period, scenario,
                    amount, currency, organizational_unit, target_department, target_account,
                    version, source_identifier, source_description, mapping_status,
                    import_batch_id, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17
                )
                "#,
            )?;

            for record in records {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    record.combo_id,
                    record.year(),
                    record.month(),
                    record.period.label(),
                    record.scenario,
                    record.amount,
                    record.currency,
                    record.organizational_unit,
                    record.target_department,
                    record.target_account,
                    record.version,
                    record.source_identifier,
                    record.source_description,
                    record.mapping_status.as_str(),
                    record.import_batch_id,
                    created_at,
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    async fn get_mapping_rules(&self, config_id: &str) -> RepositoryResult<Vec<MappingEntry>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT config_id, source_account, source_department,
                   target_account, target_department, is_active
            FROM mapping_rule
            WHERE config_id = ?1
            ORDER BY rule_id
            "#,
        )?;

        let rules = stmt
            .query_map(params![config_id], |row| {
                Ok(MappingEntry {
                    config_id: row.get(0)?,
                    source_account: row.get(1)?,
                    source_department: row.get(2)?,
                    target_account: row.get(3)?,
                    target_department: row.get(4)?,
                    is_active: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    async fn get_organizational_unit_currency(
        &self,
        organizational_unit: &str,
    ) -> RepositoryResult<Option<String>> {
        let conn = self.conn.lock()?;
        let currency: Option<Option<String>> = conn
            .query_row(
                "SELECT currency FROM organizational_unit WHERE ou_id = ?1",
                params![organizational_unit],
                |row| row.get(0),
            )
            .optional()?;

        Ok(currency
            .flatten()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }
}

fn map_staging_row(row: &Row<'_>) -> rusqlite::Result<StagingRecord> {
    let period_raw: String = row.get(1)?;
    let period = ReportingPeriod::parse(&period_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("无效的报告期: {}", period_raw).into(),
        )
    })?;

    let status_raw: String = row.get(11)?;
    let mapping_status = status_raw
        .parse::<MappingStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, e.into()))?;

    Ok(StagingRecord {
        combo_id: row.get(0)?,
        period,
        scenario: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        organizational_unit: row.get(5)?,
        target_department: row.get(6)?,
        target_account: row.get(7)?,
        version: row.get(8)?,
        source_identifier: row.get(9)?,
        source_description: row.get(10)?,
        mapping_status,
        import_batch_id: row.get(12)?,
    })
}

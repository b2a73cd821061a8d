// ==========================================
// 财务导入引擎 - 映射规则解析器
// ==========================================
// 职责: 加载有效重分类规则, 按来源标识 O(1) 查找目标科目/部门
// 冲突: 同一来源标识出现在多条有效规则中时, 后加载者覆盖先加载者
// ==========================================

use crate::domain::{MappingEntry, MappingStatus, UNMAPPED_COMBO_ID};
use crate::repository::{RepositoryResult, StagingGateway};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 单个来源标识的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: MappingStatus,
    /// mapped: "{部门}_{科目}"; unmapped: "UNMAPPED"; partial: None
    pub combo_id: Option<String>,
    pub target_department: Option<String>,
    pub target_account: Option<String>,
}

impl Resolution {
    fn unmapped() -> Self {
        Self {
            status: MappingStatus::Unmapped,
            combo_id: Some(UNMAPPED_COMBO_ID.to_string()),
            target_department: None,
            target_account: None,
        }
    }
}

#[derive(Debug, Clone)]
struct RuleTarget {
    department: Option<String>,
    account: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ==========================================
// MappingResolver
// ==========================================
// 每次导入重新加载, 不跨运行缓存
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    config_id: String,
    rules: HashMap<String, RuleTarget>,
}

impl MappingResolver {
    /// 从持久化网关加载规则
    ///
    /// # 参数
    /// - gateway: 暂存区网关
    /// - config_id: 映射配置ID
    pub async fn load<G>(gateway: &G, config_id: &str) -> RepositoryResult<Self>
    where
        G: StagingGateway + ?Sized,
    {
        let entries = gateway.get_mapping_rules(config_id).await?;
        Ok(Self::from_entries(config_id, entries))
    }

    /// 从规则列表构建（仅保留 is_active = true 的规则）
    pub fn from_entries(config_id: &str, entries: Vec<MappingEntry>) -> Self {
        let mut rules = HashMap::with_capacity(entries.len());
        let mut collisions = 0usize;

        for entry in entries.into_iter().filter(|e| e.is_active) {
            let source = entry.source_account.trim().to_string();
            if source.is_empty() {
                continue;
            }
            let target = RuleTarget {
                department: non_blank(&entry.target_department),
                account: non_blank(&entry.target_account),
            };
            if rules.insert(source.clone(), target).is_some() {
                collisions += 1;
                warn!(
                    config_id = %config_id,
                    source_identifier = %source,
                    "来源标识重复出现在多条有效规则中, 以后加载的规则为准"
                );
            }
        }

        debug!(
            config_id = %config_id,
            rule_count = rules.len(),
            collisions = collisions,
            "映射规则加载完成"
        );

        Self {
            config_id: config_id.to_string(),
            rules,
        }
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 本处理器规则覆盖的来源标识（驱逐范围）
    pub fn source_identifiers(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// 解析单个来源标识
    pub fn resolve(&self, source_identifier: &str) -> Resolution {
        let Some(target) = self.rules.get(source_identifier.trim()) else {
            return Resolution::unmapped();
        };

        match (&target.department, &target.account) {
            (Some(department), Some(account)) => Resolution {
                status: MappingStatus::Mapped,
                combo_id: Some(format!("{}_{}", department, account)),
                target_department: Some(department.clone()),
                target_account: Some(account.clone()),
            },
            (None, None) => Resolution::unmapped(),
            // 仅一侧有值: 无法构成组合, 但保留已知目标字段供下游排查
            (department, account) => Resolution {
                status: MappingStatus::Partial,
                combo_id: None,
                target_department: department.clone(),
                target_account: account.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(entries: Vec<MappingEntry>) -> MappingResolver {
        MappingResolver::from_entries("gl_balances", entries)
    }

    #[test]
    fn test_resolve_mapped() {
        let r = resolver(vec![MappingEntry::new("gl_balances", "X", Some("D01"), Some("A01"))]);
        let res = r.resolve("X");
        assert_eq!(res.status, MappingStatus::Mapped);
        assert_eq!(res.combo_id.as_deref(), Some("D01_A01"));
    }

    #[test]
    fn test_resolve_absent_is_unmapped() {
        let r = resolver(vec![]);
        let res = r.resolve("Y");
        assert_eq!(res.status, MappingStatus::Unmapped);
        assert_eq!(res.combo_id.as_deref(), Some(UNMAPPED_COMBO_ID));
        assert!(res.target_account.is_none());
        assert!(res.target_department.is_none());
    }

    #[test]
    fn test_resolve_partial_keeps_known_target() {
        let r = resolver(vec![MappingEntry::new("gl_balances", "X", None, Some("A01"))]);
        let res = r.resolve("X");
        assert_eq!(res.status, MappingStatus::Partial);
        assert_eq!(res.combo_id, None);
        assert_eq!(res.target_account.as_deref(), Some("A01"));
        assert_eq!(res.target_department, None);
    }

    #[test]
    fn test_blank_target_counts_as_missing() {
        let r = resolver(vec![MappingEntry::new("gl_balances", "X", Some("  "), Some("A01"))]);
        assert_eq!(r.resolve("X").status, MappingStatus::Partial);
    }

    #[test]
    fn test_inactive_rules_are_ignored() {
        let mut entry = MappingEntry::new("gl_balances", "X", Some("D01"), Some("A01"));
        entry.is_active = false;
        let r = resolver(vec![entry]);
        assert!(r.is_empty());
        assert_eq!(r.resolve("X").status, MappingStatus::Unmapped);
    }

    #[test]
    fn test_last_loaded_rule_wins() {
        let r = resolver(vec![
            MappingEntry::new("gl_balances", "X", Some("D01"), Some("A01")),
            MappingEntry::new("gl_balances", "X", Some("D02"), Some("A02")),
        ]);
        assert_eq!(r.len(), 1);
        assert_eq!(r.resolve("X").combo_id.as_deref(), Some("D02_A02"));
    }
}

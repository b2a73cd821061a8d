// ==========================================
// 财务导入引擎 - 内置处理器
// ==========================================

pub mod gl_balances;
pub mod hotel_statistics;
pub mod trial_balance;

pub use gl_balances::GlBalancesProcessor;
pub use hotel_statistics::HotelStatisticsProcessor;
pub use trial_balance::TrialBalanceProcessor;

use crate::importer::importer_trait::ImportProcessor;
use std::sync::Arc;

/// 注册表初始化时装载的全部内置处理器
pub fn builtin_processors() -> Vec<Arc<dyn ImportProcessor>> {
    vec![
        Arc::new(GlBalancesProcessor::new()),
        Arc::new(TrialBalanceProcessor::new()),
        Arc::new(HotelStatisticsProcessor::new()),
    ]
}

// ==========================================
// ImportRegistry 集成测试
// ==========================================
// 测试目标: 处理器目录、统一结果信封、校验闸门、顺序执行
// ==========================================


use ledger_import::domain::{
    FileFormat, ParsedRow, ProcessorCategory, ProcessorMetadata, ProcessorState,
};
use ledger_import::importer::{
    ExecutionRequest, ExtractedMeasure, ImportError, ImportProcessor, RowExtraction,
};
use ledger_import::logging;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use test_helpers::{test_options, TestEnv};

/// 需要 customer_id 列的测试处理器; 记录 extract 是否被调用
struct CustomerRevenueProcessor {
    metadata: ProcessorMetadata,
    reached: Arc<AtomicBool>,
}

impl CustomerRevenueProcessor {
    fn new(reached: Arc<AtomicBool>) -> Self {
        Self {
            metadata: ProcessorMetadata {
                id: "customer_revenue".to_string(),
                name: "Customer revenue".to_string(),
                category: ProcessorCategory::Financial,
                version: "0.1.0".to_string(),
                supported_formats: vec![FileFormat::Csv],
                required_columns: vec!["customer_id".to_string(), "amount".to_string()],
                optional_columns: vec![],
                validation_rules: vec![],
                mapping_config_id: "customer_revenue".to_string(),
                processing_order: 5,
            },
            reached,
        }
    }
}

impl ImportProcessor for CustomerRevenueProcessor {
    fn metadata(&self) -> &ProcessorMetadata {
        &self.metadata
    }

    fn extract(&self, row: &ParsedRow) -> RowExtraction {
        self.reached.store(true, Ordering::SeqCst);
        match row.get("customer_id").filter(|v| !v.is_empty()) {
            Some(id) => RowExtraction::Measures(vec![ExtractedMeasure::new(id.clone(), 1.0)]),
            None => RowExtraction::Fail("缺少 customer_id".to_string()),
        }
    }
}

#[tokio::test]
async fn test_initialize_is_idempotent_and_ordered() {
    logging::init_test();
    let env = TestEnv::new();
    env.registry.initialize().unwrap();
    env.registry.initialize().unwrap();

    let ids: Vec<String> = env
        .registry
        .list_processors()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["gl_balances", "trial_balance", "hotel_statistics"]);
}

#[tokio::test]
async fn test_register_duplicate_is_rejected() {
    logging::init_test();
    let env = TestEnv::new();
    let reached = Arc::new(AtomicBool::new(false));

    env.registry
        .register(Arc::new(CustomerRevenueProcessor::new(reached.clone())))
        .unwrap();
    let err = env
        .registry
        .register(Arc::new(CustomerRevenueProcessor::new(reached)))
        .unwrap_err();
    assert!(matches!(err, ImportError::DuplicateProcessor(id) if id == "customer_revenue"));
}

#[tokio::test]
async fn test_unknown_processor_returns_negative_envelope() {
    logging::init_test();
    let env = TestEnv::new();
    let file = env.write_csv("gl.csv", &["account,amount", "X,1"]);

    let outcome = env.registry.execute("payroll", &file, &test_options()).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("payroll"));
    assert!(outcome.result.is_none());
    assert!(matches!(
        env.registry.get_metadata("payroll"),
        Err(ImportError::UnknownProcessor(_))
    ));
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    logging::init_test();
    let env = TestEnv::new();
    let pdf = env.write_csv("statement.pdf", &["not a table"]);
    let outcome = env.registry.execute("gl_balances", &pdf, &test_options()).await;
    assert!(!outcome.success);

    // 已知格式但不在处理器支持列表中
    let xlsm = env.write_csv("stats.xlsm", &["segment,rooms,revenue"]);
    let outcome = env
        .registry
        .execute("hotel_statistics", &xlsm, &test_options())
        .await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("xlsm"));
}

#[tokio::test]
async fn test_missing_file_fails_validation() {
    logging::init_test();
    let env = TestEnv::new();
    let missing = env.files.path().join("missing.csv");

    let outcome = env.registry.execute("gl_balances", &missing, &test_options()).await;
    assert!(!outcome.success);
    let result = outcome.result.unwrap();
    assert_eq!(result.state, ProcessorState::ValidationFailed);
    assert!(result.messages.iter().any(|m| m.contains("文件不存在")));
}

#[tokio::test]
async fn test_missing_required_column_reports_list_and_row_count() {
    logging::init_test();
    let env = TestEnv::new();
    let reached = Arc::new(AtomicBool::new(false));
    env.registry
        .register(Arc::new(CustomerRevenueProcessor::new(reached.clone())))
        .unwrap();
    let file = env.write_csv("revenue.csv", &["account,amount", "4000,10", "4010,20"]);

    let outcome = env
        .registry
        .validate("customer_revenue", &file, &test_options())
        .await;
    let validation = outcome.validation.unwrap();
    assert!(!validation.is_valid);
    assert_eq!(validation.missing_required_columns, vec!["customer_id"]);
    assert_eq!(validation.row_count, 2);
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_validation_gates_processing() {
    logging::init_test();
    let env = TestEnv::new();
    let reached = Arc::new(AtomicBool::new(false));
    env.registry
        .register(Arc::new(CustomerRevenueProcessor::new(reached.clone())))
        .unwrap();
    let file = env.write_csv("revenue.csv", &["account,amount", "4000,10"]);

    let outcome = env
        .registry
        .execute("customer_revenue", &file, &test_options())
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.result.unwrap().state, ProcessorState::ValidationFailed);
    assert!(!reached.load(Ordering::SeqCst), "process must not be reached");
    assert_eq!(env.repo.count_staging_records().unwrap(), 0);

    // 显式跳过校验时进入处理阶段, 缺列表现为行级失败
    let mut options = test_options();
    options.skip_validation = true;
    let outcome = env
        .registry
        .execute("customer_revenue", &file, &options)
        .await;
    assert!(reached.load(Ordering::SeqCst));
    let result = outcome.result.unwrap();
    assert!(result.validation.is_none());
    assert_eq!(result.failed_rows, 1);
}

#[tokio::test]
async fn test_execute_sequence_runs_in_processing_order() {
    logging::init_test();
    let env = TestEnv::new();
    let stats = env.write_csv("stats.csv", &["segment,rooms,revenue", "Corporate,1,100"]);
    let gl = env.write_csv("gl.csv", &["account,amount", "X,1"]);

    let outcomes = env
        .registry
        .execute_sequence(vec![
            ExecutionRequest::new("hotel_statistics", stats, test_options()),
            ExecutionRequest::new("payroll", gl.clone(), test_options()),
            ExecutionRequest::new("gl_balances", gl, test_options()),
        ])
        .await;

    let ids: Vec<&str> = outcomes.iter().map(|o| o.processor_id.as_str()).collect();
    assert_eq!(ids, vec!["gl_balances", "hotel_statistics", "payroll"]);
    assert!(outcomes[0].success);
    assert!(outcomes[1].success);
    assert!(!outcomes[2].success);
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    logging::init_test();
    let env = TestEnv::new();
    env.seed_rule("gl_balances", "X", Some("D01"), Some("A01"));
    let file = env.write_csv("gl.csv", &["account,amount", "X,10", "X,-3"]);
    let options = test_options();

    let (a, b) = tokio::join!(
        env.registry.execute("gl_balances", &file, &options),
        env.registry.execute("gl_balances", &file, &options),
    );
    assert!(a.success && b.success);

    let totals = env
        .repo
        .sum_amount_by_combo(&Default::default())
        .unwrap();
    assert_eq!(totals, vec![("D01_A01".to_string(), 7.0)]);
}

#[tokio::test]
async fn test_outcome_serializes_camel_case() {
    logging::init_test();
    let env = TestEnv::new();
    let file = env.write_csv("gl.csv", &["account,amount", "X,1"]);
    let outcome = env.registry.execute("gl_balances", &file, &test_options()).await;

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["processorId"], "gl_balances");
    assert_eq!(json["result"]["recordsWritten"], 1);
    assert_eq!(json["result"]["state"], "POST_PROCESSED");
}

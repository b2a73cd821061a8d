// ==========================================
// 财务导入引擎 - 处理器注册表
// ==========================================
// 职责: 处理器目录（按 id）+ 统一执行入口
// 约束: 同一时刻只允许一个处理器运行（运行锁）
// 输出: 成功与失败都封装为 ExecutionOutcome, 不向调用方抛出异常
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::{ExecutionOutcome, ImportOptions, ProcessorMetadata, ValidationResult};
use crate::importer::engine::ImportEngine;
use crate::importer::error::{ImportError, ImporterResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::ImportProcessor;
use crate::importer::processors::builtin_processors;
use crate::repository::StagingGateway;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// 顺序执行中的单个请求
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub processor_id: String,
    pub file_path: PathBuf,
    pub options: ImportOptions,
}

impl ExecutionRequest {
    pub fn new(
        processor_id: impl Into<String>,
        file_path: impl Into<PathBuf>,
        options: ImportOptions,
    ) -> Self {
        Self {
            processor_id: processor_id.into(),
            file_path: file_path.into(),
            options,
        }
    }
}

// ==========================================
// ImportRegistry
// ==========================================
// 显式构造、按引用传递; 不使用进程级全局状态
pub struct ImportRegistry<G, C>
where
    G: StagingGateway,
    C: ImportConfigReader,
{
    engine: ImportEngine<G, C>,
    processors: RwLock<BTreeMap<String, Arc<dyn ImportProcessor>>>,
    initialized: AtomicBool,
    run_lock: Mutex<()>,
}

impl<G, C> ImportRegistry<G, C>
where
    G: StagingGateway,
    C: ImportConfigReader,
{
    /// 创建空注册表（需调用 initialize 装载内置处理器）
    pub fn new(gateway: Arc<G>, config: Arc<C>) -> Self {
        Self {
            engine: ImportEngine::new(gateway, config),
            processors: RwLock::new(BTreeMap::new()),
            initialized: AtomicBool::new(false),
            run_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &ImportEngine<G, C> {
        &self.engine
    }

    /// 装载内置处理器; 重复调用为空操作
    pub fn initialize(&self) -> ImporterResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for processor in builtin_processors() {
            self.register(processor)?;
        }
        info!(count = self.processor_count(), "处理器注册表初始化完成");
        Ok(())
    }

    /// 注册处理器
    ///
    /// # 返回
    /// - Err(DuplicateProcessor): id 已存在
    pub fn register(&self, processor: Arc<dyn ImportProcessor>) -> ImporterResult<()> {
        let id = processor.id().to_string();
        let mut processors = self
            .processors
            .write()
            .map_err(|e| ImportError::InternalError(format!("注册表锁获取失败: {}", e)))?;
        if processors.contains_key(&id) {
            return Err(ImportError::DuplicateProcessor(id));
        }
        info!(processor_id = %id, "注册处理器");
        processors.insert(id, processor);
        Ok(())
    }

    fn processor_count(&self) -> usize {
        self.processors.read().map(|p| p.len()).unwrap_or(0)
    }

    fn lookup(&self, processor_id: &str) -> ImporterResult<Arc<dyn ImportProcessor>> {
        let processors = self
            .processors
            .read()
            .map_err(|e| ImportError::InternalError(format!("注册表锁获取失败: {}", e)))?;
        processors
            .get(processor_id)
            .cloned()
            .ok_or_else(|| ImportError::UnknownProcessor(processor_id.to_string()))
    }

    /// 处理器元数据列表（按 processing_order, 其次按 id 排序）
    pub fn list_processors(&self) -> Vec<ProcessorMetadata> {
        let Ok(processors) = self.processors.read() else {
            return Vec::new();
        };
        let mut list: Vec<ProcessorMetadata> =
            processors.values().map(|p| p.metadata().clone()).collect();
        list.sort_by(|a, b| {
            a.processing_order
                .cmp(&b.processing_order)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub fn get_metadata(&self, processor_id: &str) -> ImporterResult<ProcessorMetadata> {
        self.lookup(processor_id).map(|p| p.metadata().clone())
    }

    /// 查找处理器并确认文件格式受支持
    fn prepare(
        &self,
        processor_id: &str,
        file_path: &Path,
    ) -> ImporterResult<Arc<dyn ImportProcessor>> {
        let processor = self.lookup(processor_id)?;
        let format = UniversalFileParser::detect_format(file_path, None)?;
        if !processor.metadata().supports(format) {
            return Err(ImportError::UnsupportedFormat(format!(
                "{} 不支持 .{} 文件",
                processor_id,
                format.extension()
            )));
        }
        Ok(processor)
    }

    /// 仅校验（供导入前预览）
    #[instrument(skip(self, options))]
    pub async fn validate(
        &self,
        processor_id: &str,
        file_path: &Path,
        options: &ImportOptions,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let processor = match self.prepare(processor_id, file_path) {
            Ok(processor) => processor,
            Err(err) => {
                warn!(processor_id = %processor_id, error = %err, "校验请求被拒绝");
                return ExecutionOutcome::failure(
                    processor_id,
                    err.to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let _guard = self.run_lock.lock().await;
        let validation: ValidationResult = self
            .engine
            .validate(processor.as_ref(), file_path, options)
            .await;

        ExecutionOutcome {
            success: validation.is_valid,
            processor_id: processor_id.to_string(),
            error: (!validation.is_valid).then(|| validation.errors.join("; ")),
            elapsed_ms: start.elapsed().as_millis() as u64,
            validation: Some(validation),
            result: None,
        }
    }

    /// 执行导入
    ///
    /// # 参数
    /// - processor_id: 处理器 id
    /// - file_path: 待导入文件
    /// - options: 导入选项
    ///
    /// # 返回
    /// - ExecutionOutcome: 未知处理器、格式不支持、校验失败、处理失败均以 success = false 返回
    #[instrument(skip(self, options))]
    pub async fn execute(
        &self,
        processor_id: &str,
        file_path: &Path,
        options: &ImportOptions,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let processor = match self.prepare(processor_id, file_path) {
            Ok(processor) => processor,
            Err(err) => {
                warn!(processor_id = %processor_id, error = %err, "导入请求被拒绝");
                return ExecutionOutcome::failure(
                    processor_id,
                    err.to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        // 运行锁: 驱逐与写入不得与其他处理器交叠
        let _guard = self.run_lock.lock().await;
        let result = self
            .engine
            .process(processor.as_ref(), file_path, options)
            .await;

        let error = (!result.success).then(|| result.messages.join("; "));
        ExecutionOutcome {
            success: result.success,
            processor_id: processor_id.to_string(),
            error,
            elapsed_ms: start.elapsed().as_millis() as u64,
            validation: result.validation.clone(),
            result: Some(result),
        }
    }

    /// 按 processing_order 逐个执行（严格串行, 失败不影响后续请求）
    pub async fn execute_sequence(&self, requests: Vec<ExecutionRequest>) -> Vec<ExecutionOutcome> {
        let mut ordered = requests;
        ordered.sort_by_key(|r| {
            self.lookup(&r.processor_id)
                .map(|p| p.metadata().processing_order)
                .unwrap_or(u32::MAX)
        });

        info!(count = ordered.len(), "开始顺序导入");
        stream::iter(ordered)
            .then(|request| async move {
                self.execute(&request.processor_id, &request.file_path, &request.options)
                    .await
            })
            .collect()
            .await
    }
}

// ==========================================
// 财务导入引擎 - 导入引擎
// ==========================================
// 职责: 驱动单个处理器的校验与处理流程
// 流程: 解析 → 结构校验 → 行抽取 → 映射聚合 → 驱逐 → 分批写入 → 后处理
// 说明: 所有错误在 process()/validate() 边界转换为否定结果, 不向外抛出
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::{
    ImportBatchId, ImportOptions, ImportResult, MappingStatus, ParseOptions, ParsedFile,
    ProcessorState, RowError, ValidationResult,
};
use crate::importer::error::{ImportError, ImporterResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::{ImportProcessor, RowExtraction, StructuralContext};
use crate::importer::lifecycle::ProcessorLifecycle;
use crate::importer::mapping_resolver::MappingResolver;
use crate::importer::row_aggregator::{AggregationContext, RowAggregator};
use crate::importer::staging_writer::StagingWriter;
use crate::repository::{RepositoryError, StagingGateway};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// 解析缓存
// ==========================================
// 同一运行内 validate 与 process 共用一次解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParseCacheKey {
    path: PathBuf,
    options: ParseOptions,
    modified: Option<SystemTime>,
}

struct CachedParse {
    key: ParseCacheKey,
    parsed: Arc<ParsedFile>,
}

/// 单次处理的运行时参数（配置与选项合并后）
struct RunSettings {
    batch_size: usize,
    mapping_config_id: String,
    context: AggregationContext,
}

fn config_error(key: &str) -> impl FnOnce(RepositoryError) -> ImportError + '_ {
    move |err| ImportError::ConfigReadError {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ==========================================
// ImportEngine
// ==========================================
pub struct ImportEngine<G, C>
where
    G: StagingGateway,
    C: ImportConfigReader,
{
    // 暂存区网关
    gateway: Arc<G>,

    // 配置读取器
    config: Arc<C>,

    parse_cache: Mutex<Option<CachedParse>>,
}

impl<G, C> ImportEngine<G, C>
where
    G: StagingGateway,
    C: ImportConfigReader,
{
    /// 创建导入引擎
    ///
    /// # 参数
    /// - gateway: 暂存区网关
    /// - config: 配置读取器
    pub fn new(gateway: Arc<G>, config: Arc<C>) -> Self {
        Self {
            gateway,
            config,
            parse_cache: Mutex::new(None),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn config(&self) -> &Arc<C> {
        &self.config
    }

    /// 清空解析缓存
    pub fn clear_parse_cache(&self) {
        if let Ok(mut cache) = self.parse_cache.lock() {
            *cache = None;
        }
    }

    // ==========================================
    // 文件解析（带缓存）
    // ==========================================

    /// 解析文件; 路径、解析选项、修改时间均未变化时复用上次结果
    pub async fn parse_file(
        &self,
        file_path: &Path,
        options: &ParseOptions,
    ) -> ImporterResult<Arc<ParsedFile>> {
        let modified = tokio::fs::metadata(file_path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        let key = ParseCacheKey {
            path: file_path.to_path_buf(),
            options: options.clone(),
            modified,
        };

        {
            let cache = self
                .parse_cache
                .lock()
                .map_err(|e| ImportError::InternalError(format!("解析缓存锁获取失败: {}", e)))?;
            if let Some(cached) = cache.as_ref().filter(|c| c.key == key && modified.is_some()) {
                debug!(file = %file_path.display(), "复用解析缓存");
                return Ok(Arc::clone(&cached.parsed));
            }
        }

        // 文件解码为阻塞 I/O, 放入阻塞线程池
        let path = file_path.to_path_buf();
        let parse_options = options.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            UniversalFileParser.parse(&path, None, &parse_options)
        })
        .await
        .map_err(|e| ImportError::InternalError(format!("解析任务异常退出: {}", e)))??;

        let parsed = Arc::new(parsed);
        debug!(
            file = %file_path.display(),
            rows = parsed.row_count,
            columns = parsed.columns.len(),
            "文件解析完成"
        );

        let mut cache = self
            .parse_cache
            .lock()
            .map_err(|e| ImportError::InternalError(format!("解析缓存锁获取失败: {}", e)))?;
        *cache = Some(CachedParse {
            key,
            parsed: Arc::clone(&parsed),
        });

        Ok(parsed)
    }

    // ==========================================
    // 校验
    // ==========================================

    /// 校验文件结构（不写入任何数据）
    ///
    /// # 返回
    /// - ValidationResult: 文件错误同样以 is_valid = false 返回
    #[instrument(skip(self, processor, options), fields(processor_id = %processor.id()))]
    pub async fn validate(
        &self,
        processor: &dyn ImportProcessor,
        file_path: &Path,
        options: &ImportOptions,
    ) -> ValidationResult {
        let mut lifecycle = ProcessorLifecycle::new(processor.id());
        self.validate_with(processor, file_path, options, &mut lifecycle)
            .await
    }

    async fn validate_with(
        &self,
        processor: &dyn ImportProcessor,
        file_path: &Path,
        options: &ImportOptions,
        lifecycle: &mut ProcessorLifecycle,
    ) -> ValidationResult {
        let processor_id = processor.id().to_string();

        let validation = match lifecycle.advance(ProcessorState::Validating) {
            Ok(()) => match self.check_file(processor, file_path, options).await {
                Ok(validation) => validation,
                Err(err) => {
                    warn!(processor_id = %processor_id, error = %err, "校验阶段文件错误");
                    ValidationResult::failed(&processor_id, err.to_string())
                }
            },
            Err(err) => ValidationResult::failed(&processor_id, err.to_string()),
        };

        let next = if validation.is_valid {
            ProcessorState::Validated
        } else {
            ProcessorState::ValidationFailed
        };
        if let Err(err) = lifecycle.advance(next) {
            error!(processor_id = %processor_id, error = %err, "状态机异常");
        }

        info!(
            processor_id = %processor_id,
            is_valid = validation.is_valid,
            row_count = validation.row_count,
            errors = validation.errors.len(),
            "结构校验完成"
        );
        validation
    }

    async fn check_file(
        &self,
        processor: &dyn ImportProcessor,
        file_path: &Path,
        options: &ImportOptions,
    ) -> ImporterResult<ValidationResult> {
        if options.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let parsed = self.parse_file(file_path, &options.parse).await?;
        let metadata = processor.metadata();

        let mut validation = ValidationResult {
            is_valid: false,
            processor_id: metadata.id.clone(),
            columns: parsed.columns.clone(),
            row_count: parsed.row_count,
            ..ValidationResult::default()
        };

        let missing = parsed.missing_columns(&metadata.required_columns);
        if !missing.is_empty() {
            validation
                .errors
                .push(ImportError::MissingRequiredColumns(missing.clone()).to_string());
            validation.missing_required_columns = missing;
        } else {
            let context = self.structural_context(processor, options).await?;
            let violations = processor.check_structure(&parsed, &context);
            validation.errors.extend(violations);
        }

        if parsed.row_count == 0 {
            validation.warnings.push("文件无数据行".to_string());
        }

        validation.is_valid = validation.errors.is_empty();
        Ok(validation)
    }

    async fn structural_context(
        &self,
        processor: &dyn ImportProcessor,
        options: &ImportOptions,
    ) -> ImporterResult<StructuralContext> {
        let expected_location_code = self
            .config
            .get_expected_location_code(processor.id())
            .await
            .map_err(config_error("location_code"))?;

        Ok(StructuralContext {
            period: options.period,
            organizational_unit: options.organizational_unit.clone(),
            expected_location_code,
        })
    }

    // ==========================================
    // 处理
    // ==========================================

    /// 执行完整导入（校验 → 处理 → 后处理）
    ///
    /// # 返回
    /// - ImportResult: 成功或失败均通过结果对象返回, 附带最终状态
    #[instrument(skip(self, processor, options), fields(processor_id = %processor.id(), import_batch_id))]
    pub async fn process(
        &self,
        processor: &dyn ImportProcessor,
        file_path: &Path,
        options: &ImportOptions,
    ) -> ImportResult {
        let start = Instant::now();
        let processor_id = processor.id().to_string();
        let batch_id = ImportBatchId::generate(&processor_id);
        tracing::Span::current().record("import_batch_id", batch_id.as_str());

        let mut lifecycle = ProcessorLifecycle::new(&processor_id);
        let mut result = ImportResult::new(&processor_id);
        result.import_batch_id = Some(batch_id.to_string());

        info!(
            processor_id = %processor_id,
            file = %file_path.display(),
            period = %options.period,
            organizational_unit = %options.organizational_unit,
            "开始导入"
        );

        // === 步骤 1: 结构校验（可显式跳过）===
        // 已取消的运行直接进入处理阶段, 以 ProcessingFailed 收尾
        if options.skip_validation || options.is_cancelled() {
            debug!("跳过结构校验");
        } else {
            let validation = self
                .validate_with(processor, file_path, options, &mut lifecycle)
                .await;
            result.row_count = validation.row_count;
            let is_valid = validation.is_valid;
            if !is_valid {
                result.messages.extend(validation.errors.iter().cloned());
            }
            result.validation = Some(validation);
            if !is_valid {
                result.state = lifecycle.state();
                result.elapsed_ms = elapsed_ms(start);
                warn!(processor_id = %processor_id, "结构校验未通过, 不进入处理阶段");
                return result;
            }
        }

        // === 步骤 2..N: 处理 ===
        match self
            .run_pipeline(processor, file_path, options, &batch_id, &mut lifecycle, &mut result)
            .await
        {
            Ok(()) => {
                result.success = true;
            }
            Err(err) => {
                lifecycle.fail();
                result.success = false;
                result.messages.push(err.to_string());
                error!(
                    processor_id = %processor_id,
                    kind = ?err.kind(),
                    error = %err,
                    "导入失败"
                );
            }
        }

        result.state = lifecycle.state();
        result.elapsed_ms = elapsed_ms(start);

        info!(
            processor_id = %processor_id,
            success = result.success,
            state = %result.state,
            row_count = result.row_count,
            processed = result.processed_rows,
            skipped = result.skipped_rows,
            failed = result.failed_rows,
            written = result.records_written,
            evicted = result.records_evicted,
            elapsed_ms = result.elapsed_ms,
            "导入结束"
        );
        result
    }

    async fn resolve_settings(
        &self,
        processor: &dyn ImportProcessor,
        options: &ImportOptions,
        batch_id: &ImportBatchId,
    ) -> ImporterResult<RunSettings> {
        let metadata = processor.metadata();

        let batch_size = match options.batch_size {
            Some(size) if size > 0 => size,
            _ => self
                .config
                .get_staging_batch_size()
                .await
                .map_err(config_error("staging_batch_size"))?,
        };

        let scenario = match &options.scenario {
            Some(scenario) => scenario.clone(),
            None => self
                .config
                .get_default_scenario()
                .await
                .map_err(config_error("default_scenario"))?,
        };

        let version = match &options.version {
            Some(version) => version.clone(),
            None => self
                .config
                .get_default_version()
                .await
                .map_err(config_error("default_version"))?,
        };

        // 币种: 选项 → 组织单元 → 全局默认
        let currency = match &options.currency {
            Some(currency) => currency.clone(),
            None => match self
                .gateway
                .get_organizational_unit_currency(&options.organizational_unit)
                .await?
            {
                Some(currency) => currency,
                None => self
                    .config
                    .get_default_currency()
                    .await
                    .map_err(config_error("default_currency"))?,
            },
        };

        let mapping_config_id = self
            .config
            .get_mapping_config_override(&metadata.id)
            .await
            .map_err(config_error("mapping_config"))?
            .unwrap_or_else(|| metadata.mapping_config_id.clone());

        Ok(RunSettings {
            batch_size,
            mapping_config_id,
            context: AggregationContext {
                period: options.period,
                scenario,
                currency,
                organizational_unit: options.organizational_unit.clone(),
                version,
                import_batch_id: batch_id.to_string(),
            },
        })
    }

    async fn run_pipeline(
        &self,
        processor: &dyn ImportProcessor,
        file_path: &Path,
        options: &ImportOptions,
        batch_id: &ImportBatchId,
        lifecycle: &mut ProcessorLifecycle,
        result: &mut ImportResult,
    ) -> ImporterResult<()> {
        lifecycle.advance(ProcessorState::Processing)?;

        // === 步骤 2: 解析（复用校验阶段缓存）===
        if options.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let parsed = self.parse_file(file_path, &options.parse).await?;
        result.row_count = parsed.row_count;
        if options.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        // === 步骤 3: 合并配置, 加载映射规则 ===
        let settings = self.resolve_settings(processor, options, batch_id).await?;
        let resolver = MappingResolver::load(self.gateway.as_ref(), &settings.mapping_config_id)
            .await?;
        debug!(
            mapping_config_id = %settings.mapping_config_id,
            rules = resolver.len(),
            batch_size = settings.batch_size,
            "运行参数就绪"
        );

        // === 步骤 4: 行抽取 + 聚合 ===
        let hooks = processor.hooks();
        let mut aggregator = RowAggregator::new(&resolver, &settings.context);

        for (idx, row) in parsed.rows.iter().enumerate() {
            let row_number = idx + 1;

            let Some(row) = hooks.transform(row.clone()) else {
                result.skipped_rows += 1;
                debug!(row_number = row_number, "行被 transform 钩子跳过");
                continue;
            };

            let outcome = match hooks.validate(&row) {
                Ok(()) => processor.extract(&row),
                Err(message) => RowExtraction::Fail(message),
            };

            match outcome {
                RowExtraction::Measures(measures) => {
                    for measure in &measures {
                        aggregator.add(measure);
                    }
                    result.processed_rows += 1;
                }
                RowExtraction::Skip(reason) => {
                    result.skipped_rows += 1;
                    warn!(row_number = row_number, reason = %reason, "行已跳过");
                }
                RowExtraction::Fail(message) => {
                    result.failed_rows += 1;
                    warn!(row_number = row_number, error = %message, "行处理失败");
                    result.row_errors.push(RowError {
                        row_number,
                        message: message.clone(),
                    });
                    if options.stop_on_error {
                        return Err(ImportError::RowError {
                            row: row_number,
                            message,
                        });
                    }
                }
            }
        }

        if let Some(sentinel) = processor.sentinel() {
            aggregator.ensure_sentinel(&sentinel);
        }

        result.unmapped_count = aggregator.count_by_status(MappingStatus::Unmapped);
        result.partial_count = aggregator.count_by_status(MappingStatus::Partial);
        let candidates = aggregator.into_candidates();
        info!(
            candidates = candidates.len(),
            unmapped = result.unmapped_count,
            partial = result.partial_count,
            "聚合完成"
        );

        // === 步骤 5: 驱逐旧暂存记录 ===
        // 规则来源标识 + 控制合计: 按来源标识驱逐
        // 其余候选来源标识（未映射）: 仅驱逐本处理器批次写入的记录
        let rule_set: BTreeSet<String> = resolver
            .source_identifiers()
            .map(str::to_string)
            .chain(processor.sentinel().map(|s| s.source_identifier))
            .collect();
        let owned_set: BTreeSet<String> = candidates
            .iter()
            .map(|c| c.source_identifier.clone())
            .filter(|source| !rule_set.contains(source))
            .collect();
        let rule_set: Vec<String> = rule_set.into_iter().collect();
        let owned_set: Vec<String> = owned_set.into_iter().collect();

        let writer = StagingWriter::new(self.gateway.as_ref()).with_cancel(options.cancel.as_ref());
        result.records_evicted = writer.evict_matching(&rule_set).await?;
        result.records_evicted += writer.evict_owned(&owned_set, processor.id()).await?;

        // === 步骤 6: 分批写入 ===
        result.records_written = writer
            .write_batch(&candidates, settings.batch_size)
            .await?;
        lifecycle.advance(ProcessorState::Processed)?;

        // === 步骤 7: 后处理 ===
        let notes = processor.post_process(&candidates);
        for note in &notes {
            warn!(note = %note, "后处理提示");
        }
        result.messages.extend(notes);
        result.messages.push(format!(
            "已写入 {} 条暂存记录（处理 {} 行, 跳过 {} 行, 失败 {} 行）",
            result.records_written, result.processed_rows, result.skipped_rows, result.failed_rows
        ));
        lifecycle.advance(ProcessorState::PostProcessed)?;

        Ok(())
    }
}

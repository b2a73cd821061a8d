// ==========================================
// 财务导入引擎 - 处理器生命周期状态机
// ==========================================
// Registered → Validating → {ValidationFailed | Validated}
//            → Processing → {ProcessingFailed | Processed} → PostProcessed
// 跳过校验时允许 Registered → Processing
// ==========================================

use crate::domain::ProcessorState;
use crate::importer::error::{ImportError, ImporterResult};
use tracing::debug;

/// 单次运行的状态跟踪（每次执行新建）
#[derive(Debug, Clone)]
pub struct ProcessorLifecycle {
    processor_id: String,
    state: ProcessorState,
    history: Vec<ProcessorState>,
}

impl ProcessorLifecycle {
    pub fn new(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
            state: ProcessorState::Registered,
            history: vec![ProcessorState::Registered],
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn history(&self) -> &[ProcessorState] {
        &self.history
    }

    /// 推进到下一状态
    ///
    /// # 返回
    /// - Err(InvalidStateTransition): 违反状态机
    pub fn advance(&mut self, next: ProcessorState) -> ImporterResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ImportError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", next),
            });
        }
        debug!(
            processor_id = %self.processor_id,
            from = ?self.state,
            to = ?next,
            "处理器状态变更"
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// 失败收尾: 按当前阶段落到对应终止状态
    pub fn fail(&mut self) {
        use ProcessorState::*;
        let path: &[ProcessorState] = match self.state {
            Registered => &[Validating, ValidationFailed],
            Validating => &[ValidationFailed],
            Validated => &[Processing, ProcessingFailed],
            Processing => &[ProcessingFailed],
            _ => &[],
        };
        for next in path {
            if self.advance(*next).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_happy_path() {
        let mut lc = ProcessorLifecycle::new("gl_balances");
        for next in [
            ProcessorState::Validating,
            ProcessorState::Validated,
            ProcessorState::Processing,
            ProcessorState::Processed,
            ProcessorState::PostProcessed,
        ] {
            lc.advance(next).unwrap();
        }
        assert_eq!(lc.state(), ProcessorState::PostProcessed);
        assert!(lc.state().is_terminal());
        assert_eq!(lc.history().len(), 6);
    }

    #[test]
    fn test_illegal_transition_is_error() {
        let mut lc = ProcessorLifecycle::new("gl_balances");
        let err = lc.advance(ProcessorState::Processed).unwrap_err();
        assert!(matches!(err, ImportError::InvalidStateTransition { .. }));
        assert_eq!(lc.state(), ProcessorState::Registered);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut lc = ProcessorLifecycle::new("gl_balances");
        lc.advance(ProcessorState::Validating).unwrap();
        lc.advance(ProcessorState::ValidationFailed).unwrap();
        assert!(lc.advance(ProcessorState::Processing).is_err());
    }

    #[test]
    fn test_fail_from_processing() {
        let mut lc = ProcessorLifecycle::new("gl_balances");
        lc.advance(ProcessorState::Processing).unwrap();
        lc.fail();
        assert_eq!(lc.state(), ProcessorState::ProcessingFailed);
    }

    #[test]
    fn test_fail_from_validated_passes_through_processing() {
        let mut lc = ProcessorLifecycle::new("gl_balances");
        lc.advance(ProcessorState::Validating).unwrap();
        lc.advance(ProcessorState::Validated).unwrap();
        lc.fail();
        assert_eq!(lc.state(), ProcessorState::ProcessingFailed);
        let history = lc.history();
        assert_eq!(
            &history[history.len() - 2..],
            &[ProcessorState::Processing, ProcessorState::ProcessingFailed]
        );
    }
}

use crate::SchedulerError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    panic,
    sync::{Arc, OnceLock},
    thread,
};

/// Stack reserved for everything but the nested call frames.
const BASE_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Stack reserved per level of call nesting. One level spans the interpreter, the host call and
/// the frame bookkeeping around it.
const FRAME_STACK_SIZE: usize = 128 * 1024;

/// Stack size of threads executing transactions with calls nested up to `max_call_depth` deep.
///
/// Nested calls recurse on the native stack, so the stack has to grow with the depth bound.
pub(crate) const fn execution_stack_size(max_call_depth: u32) -> usize {
    BASE_STACK_SIZE.saturating_add((max_call_depth as usize).saturating_mul(FRAME_STACK_SIZE))
}

/// Run `f` to completion on a dedicated thread with `stack_size` bytes of stack.
///
/// A panic in `f` is resumed on the calling thread.
pub(crate) fn on_execution_stack<F, R>(stack_size: usize, f: F) -> Result<R, SchedulerError>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("txflow-block".to_string())
            .stack_size(stack_size)
            .spawn_scoped(scope, f)
            .map_err(|error| {
                SchedulerError::Internal(format!("failed to spawn execution thread: {error}"))
            })?;
        match handle.join() {
            Ok(result) => Ok(result),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Rayon pool running the lanes of sharded blocks, built on first use.
///
/// Its workers reserve the same stack as the block thread.
#[derive(Clone, Debug, Default)]
pub(crate) struct LanePool(Arc<OnceLock<ThreadPool>>);

impl LanePool {
    pub(crate) fn get(&self, stack_size: usize) -> Result<&ThreadPool, SchedulerError> {
        if let Some(pool) = self.0.get() {
            return Ok(pool)
        }
        let pool = ThreadPoolBuilder::new()
            .thread_name(|index| format!("txflow-lane-{index}"))
            .stack_size(stack_size)
            .build()
            .map_err(|error| SchedulerError::Internal(format!("failed to build lane pool: {error}")))?;
        Ok(self.0.get_or_init(|| pool))
    }
}

//! Driving async unit-of-work operations from synchronous callers.

use std::future::Future;

use tokio::runtime::{Builder, Handle, RuntimeFlavor};

use crate::error::{UowError, UowResult};

/// Block the current thread until `fut` completes.
///
/// - On a multi-thread runtime worker the thread is handed over with
///   `block_in_place` and the future runs on the ambient runtime.
/// - On a current-thread runtime the ambient runtime cannot be re-entered,
///   so the future runs to completion on a helper thread with its own
///   runtime. Resources bound to the ambient runtime's I/O driver (pooled
///   database connections) are not usable from there.
/// - Outside any runtime a temporary one is built.
pub(crate) fn block_on<F>(fut: F) -> UowResult<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(_) => std::thread::scope(|scope| {
            let worker = scope.spawn(|| run_on_fresh_runtime(fut));
            match worker.join() {
                Ok(res) => res,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }),
        Err(_) => run_on_fresh_runtime(fut),
    }
}

fn run_on_fresh_runtime<F: Future>(fut: F) -> UowResult<F::Output> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| UowError::Runtime(e.to_string()))?;
    Ok(rt.block_on(fut))
}

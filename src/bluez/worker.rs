use std::future::Future;
use std::thread;

use tokio::runtime;

/// Runs `future` as a detached worker.
///
/// Inside a tokio runtime the worker is a task on that runtime; otherwise it
/// gets its own thread driving a current-thread runtime.
pub(crate) fn spawn_worker<F>(name: String, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = runtime::Handle::try_current() {
        log::trace!("spawning {} on the current runtime", name);
        handle.spawn(future);
        return;
    }

    let thread_name = name.clone();
    let spawned = thread::Builder::new().name(thread_name).spawn(move || {
        let runtime = runtime::Builder::new_current_thread().enable_time().build();
        match runtime {
            Ok(runtime) => runtime.block_on(future),
            Err(e) => log::error!("Failed to create runtime for {}: {}", name, e),
        }
    });
    if let Err(e) = spawned {
        log::error!("Failed to spawn worker thread: {}", e);
    }
}

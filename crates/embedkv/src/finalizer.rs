//! Process-wide exit finalizers.
//!
//! Each running instance registers a callback that kills its child. The
//! callbacks run once when the owning program exits normally (via the C
//! runtime `atexit` hook), so a forgotten `stop()` never leaves an orphaned
//! store process behind. Dropping the returned [`ExitGuard`] deregisters the
//! callback.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

type Finalizer = Box<dyn FnOnce() + Send>;

struct Registry {
    next_id: u64,
    finalizers: BTreeMap<u64, Finalizer>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    next_id: 0,
    finalizers: BTreeMap::new(),
});

static INSTALL_HOOK: Once = Once::new();

fn registry() -> MutexGuard<'static, Registry> {
    // Finalizers must still run after a panic elsewhere poisoned the lock.
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a finalizer registered; dropping it removes the finalizer unrun.
#[derive(Debug)]
#[must_use = "dropping the guard deregisters the finalizer immediately"]
pub struct ExitGuard {
    id: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        registry().finalizers.remove(&self.id);
    }
}

/// Registers `finalizer` to run at process exit.
pub fn register(finalizer: impl FnOnce() + Send + 'static) -> ExitGuard {
    INSTALL_HOOK.call_once(install_exit_hook);

    let mut registry = registry();
    let id = registry.next_id;
    registry.next_id += 1;
    registry.finalizers.insert(id, Box::new(finalizer));
    ExitGuard { id }
}

/// Runs and clears every registered finalizer, oldest first.
///
/// Called automatically at exit; safe to call earlier, e.g. from a signal
/// handler's shutdown path.
pub fn run_exit_finalizers() {
    // Take the callbacks out first so a finalizer can't deadlock on the registry.
    let finalizers = std::mem::take(&mut registry().finalizers);
    for (_, finalizer) in finalizers {
        finalizer();
    }
}

/// Number of finalizers currently registered.
pub fn pending() -> usize {
    registry().finalizers.len()
}

extern "C" fn exit_hook() {
    run_exit_finalizers();
}

#[allow(unsafe_code)]
fn install_exit_hook() {
    // SAFETY: `exit_hook` is a plain `extern "C"` fn with no arguments that
    // never unwinds across the FFI boundary (finalizers only send signals).
    let rc = unsafe { libc::atexit(exit_hook) };
    if rc != 0 {
        tracing::warn!("could not install exit hook; orphaned children are possible");
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Shared Ctrl-C flag, polled by the subprocess runner and the harness loop
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a process-wide Ctrl-C handler that sets this flag.
    /// Only one handler can exist per process.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.0.clone();
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                // Second Ctrl-C: the restore is already underway
                warn!("Interrupt received again, waiting for the manifest restore to finish");
            } else {
                warn!("Interrupt received, restoring the manifest before exiting");
            }
        })
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

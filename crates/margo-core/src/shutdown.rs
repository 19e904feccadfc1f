//! Cooperative shutdown for long runs
//!
//! Extraction loops and the job scheduler poll this flag so a signal stops
//! the run at a partition boundary instead of mid-write. The CLI registers
//! the SIGTERM/SIGINT handlers that set it.

use std::sync::atomic::{AtomicBool, Ordering};

/// The process-wide shutdown flag. Exposed so signal handlers can `swap`
/// it and detect a repeated signal.
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Set the flag. Queued jobs still drain; new work is refused.
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

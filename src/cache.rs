//! Best-effort OS page-cache eviction between I/O phases.
//!
//! Only Linux exposes a knob for this, and it needs root. Every outcome other
//! than [`CacheDrop::Dropped`] is a warning for the caller, never an error.

use std::path::Path;

const DROP_CACHES: &str = "/proc/sys/vm/drop_caches";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDrop {
    Dropped,
    /// Platform has no cache-drop capability.
    Unsupported,
    Failed(String),
}

/// Whether this platform offers a page-cache drop at all.
pub fn is_supported() -> bool {
    cfg!(target_os = "linux") && Path::new(DROP_CACHES).exists()
}

/// Flushes dirty pages and asks the kernel to drop clean caches.
pub fn drop_page_cache() -> CacheDrop {
    if !is_supported() {
        return CacheDrop::Unsupported;
    }

    match std::process::Command::new("sync").status() {
        Ok(status) if status.success() => {}
        Ok(status) => return CacheDrop::Failed(format!("sync exited with {status}")),
        Err(e) => return CacheDrop::Failed(format!("sync failed: {e}")),
    }

    match std::fs::write(DROP_CACHES, b"3\n") {
        Ok(()) => CacheDrop::Dropped,
        Err(e) => CacheDrop::Failed(format!("cannot write {DROP_CACHES}: {e}")),
    }
}

//! Process attribution via the `/proc` filesystem.

use async_trait::async_trait;
use tunnelwatch_core::{LookupFailure, LookupResult};

use crate::traits::ProcessLookup;

/// Resolves pids through `/proc/<pid>/exe`.
///
/// On platforms without procfs every lookup fails with
/// [`LookupFailure::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsLookup;

impl ProcfsLookup {
    /// Create a new lookup
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLookup for ProcfsLookup {
    async fn executable(&self, pid: u32) -> LookupResult<String> {
        tokio::task::spawn_blocking(move || resolve_exe(pid))
            .await
            .map_err(|e| LookupFailure::Unavailable(format!("process lookup task failed: {e}")))?
    }
}

#[cfg(target_os = "linux")]
fn resolve_exe(pid: u32) -> LookupResult<String> {
    use tracing::debug;

    let pid = i32::try_from(pid)
        .map_err(|_| LookupFailure::NotFound(format!("pid {pid} out of range")))?;

    // Exe path may fail for kernel threads, exited processes or permission issues
    let proc = procfs::process::Process::new(pid).map_err(|e| {
        debug!(pid, error = %e, "process not resolvable");
        LookupFailure::NotFound(format!("pid {pid}: {e}"))
    })?;
    let exe = proc
        .exe()
        .map_err(|e| LookupFailure::NotFound(format!("pid {pid} exe: {e}")))?;

    Ok(exe.display().to_string())
}

#[cfg(not(target_os = "linux"))]
fn resolve_exe(_pid: u32) -> LookupResult<String> {
    Err(LookupFailure::Unavailable(
        "process attribution requires procfs".into(),
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_own_executable() {
        let exe = ProcfsLookup::new()
            .executable(std::process::id())
            .await
            .unwrap();
        assert!(!exe.is_empty());
    }

    #[tokio::test]
    async fn test_stale_pid_is_not_found() {
        let err = ProcfsLookup::new().executable(u32::MAX).await.unwrap_err();
        assert!(matches!(err, LookupFailure::NotFound(_)));
    }
}

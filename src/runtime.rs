//! Explicit execution context
//!
//! Conversion parallelizes per-layer weight quantization on a thread pool
//! owned by the caller. Nothing in this crate touches a process-wide
//! global pool.

use crate::error::{QuenchError, QuenchResult};

/// Caller-supplied runtime context for conversion work
pub struct Runtime {
    pool: rayon::ThreadPool,
}

impl Runtime {
    /// Runtime with rayon's default parallelism
    pub fn new() -> QuenchResult<Self> {
        Self::with_threads(0)
    }

    /// Runtime with an explicit thread count (0 = default)
    pub fn with_threads(num_threads: usize) -> QuenchResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| {
                QuenchError::InvalidState(format!("failed to build thread pool: {}", e))
            })?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run a closure inside this runtime's thread pool
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_default() {
        let rt = Runtime::new().unwrap();
        assert!(rt.num_threads() >= 1);
    }

    #[test]
    fn test_runtime_with_threads() {
        let rt = Runtime::with_threads(2).unwrap();
        assert_eq!(rt.num_threads(), 2);
    }

    #[test]
    fn test_install_runs_closure() {
        let rt = Runtime::with_threads(1).unwrap();
        let result = rt.install(|| 40 + 2);
        assert_eq!(result, 42);
    }
}

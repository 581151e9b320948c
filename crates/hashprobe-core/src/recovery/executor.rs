//! Sequential or rayon-backed execution of per-item work
use rayon::prelude::*;
use serde::Serialize;

/// How discovery work is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    Sequential,
    /// Worker pool; `None` uses one thread per logical CPU
    Parallel { threads: Option<usize> },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Parallel { threads: None }
    }
}

/// Runs a stateless closure over a batch and collects the outcomes in input order
pub enum Executor {
    Sequential,
    Parallel(rayon::ThreadPool),
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Sequential => write!(f, "Sequential"),
            Executor::Parallel(pool) => write!(f, "Parallel({})", pool.current_num_threads()),
        }
    }
}

impl Executor {
    pub fn new(mode: ExecutionMode) -> Result<Self, rayon::ThreadPoolBuildError> {
        match mode {
            ExecutionMode::Sequential => Ok(Executor::Sequential),
            ExecutionMode::Parallel { threads } => {
                let threads = threads.filter(|&n| n > 0).unwrap_or_else(num_cpus::get);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("hashprobe-worker-{}", i))
                    .build()?;
                tracing::debug!("Started discovery pool with {} threads", threads);
                Ok(Executor::Parallel(pool))
            }
        }
    }

    pub fn threads(&self) -> usize {
        match self {
            Executor::Sequential => 1,
            Executor::Parallel(pool) => pool.current_num_threads(),
        }
    }

    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            Executor::Sequential => items.iter().map(f).collect(),
            Executor::Parallel(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_and_parallel_agree() {
        let items: Vec<u64> = (0..1000).collect();
        let sequential = Executor::new(ExecutionMode::Sequential).unwrap();
        let parallel = Executor::new(ExecutionMode::Parallel { threads: Some(4) }).unwrap();

        let a = sequential.map(&items, |x| x * x);
        let b = parallel.map(&items, |x| x * x);
        assert_eq!(a, b);
        assert_eq!(parallel.threads(), 4);
        assert_eq!(sequential.threads(), 1);
    }

    #[test]
    fn test_zero_threads_means_default() {
        let executor = Executor::new(ExecutionMode::Parallel { threads: Some(0) }).unwrap();
        assert_eq!(executor.threads(), num_cpus::get());
    }
}

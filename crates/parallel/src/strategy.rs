//! Parallel processing strategies

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Processing mode for pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Worker threads this mode runs on
    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            #[cfg(feature = "parallel")]
            ProcessingMode::Parallel => rayon::current_num_threads(),
            #[cfg(not(feature = "parallel"))]
            ProcessingMode::Parallel => 1,
            ProcessingMode::ParallelWith(threads) => *threads,
        }
    }

    /// Run `f` with every nested rayon loop bound to this mode's threads.
    ///
    /// `Sequential` installs a one-thread pool so kernels written with
    /// `par_iter` run on a single worker; `Parallel` uses the global pool.
    #[cfg(feature = "parallel")]
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self {
            ProcessingMode::Parallel => f(),
            ProcessingMode::Sequential | ProcessingMode::ParallelWith(_) => match self.pool() {
                Some(pool) => pool.install(f),
                None => f(),
            },
        }
    }

    #[cfg(not(feature = "parallel"))]
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        f()
    }

    #[cfg(feature = "parallel")]
    fn pool(&self) -> Option<rayon::ThreadPool> {
        let threads = self.threads();
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(threads, error = %e, "thread pool unavailable, using global pool");
                None
            }
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    /// Map a function over a slice and collect results in slice order
    fn par_map_slice<S, T, F>(&self, items: &[S], f: F) -> Vec<T>
    where
        S: Sync,
        T: Send,
        F: Fn(&S) -> T + Sync + Send,
    {
        self.par_map(0..items.len(), |i| f(&items[i]))
    }
}

#[cfg(feature = "parallel")]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(_) => match self.pool() {
                Some(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                None => range.into_par_iter().map(f).collect(),
            },
        }
    }
}

#[cfg(not(feature = "parallel"))]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        range.map(f).collect()
    }
}

/// Get the number of available CPU cores
#[cfg(feature = "parallel")]
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

/// Configure the global thread pool
#[cfg(feature = "parallel")]
pub fn set_num_threads(threads: usize) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok(); // Ignore if already initialized
}

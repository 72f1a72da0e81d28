//! Shared thread pool handle and the cost-driven parallel-for used by kernels.
//!
//! The pool is a thin wrapper over [`faer::Par`]. Kernels never own threads: the caller hands a
//! pool to the kernel context and the kernel (or the accelerated engine) splits work across it
//! with [`ThreadPool::parallel_for_rows`].

use std::num::NonZeroUsize;

use faer::Par;

use crate::env;
use crate::error::Result;

/// Approximate cost of processing one unit of work.
///
/// Units are kernel-defined (one input pixel for the generic scatter, one output row for the
/// reference engine). The weights only steer partition sizes, they are never exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorOpCost {
    pub bytes_loaded: f64,
    pub bytes_stored: f64,
    pub compute_cycles: f64,
}

const LOAD_CYCLES_PER_BYTE: f64 = 0.25;
const STORE_CYCLES_PER_BYTE: f64 = 0.25;

impl TensorOpCost {
    pub const fn new(bytes_loaded: f64, bytes_stored: f64, compute_cycles: f64) -> Self {
        Self {
            bytes_loaded,
            bytes_stored,
            compute_cycles,
        }
    }

    /// Scales every component, e.g. by the channel count when a unit covers all channels.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            bytes_loaded: self.bytes_loaded * factor,
            bytes_stored: self.bytes_stored * factor,
            compute_cycles: self.compute_cycles * factor,
        }
    }

    pub fn total_cycles(&self) -> f64 {
        self.bytes_loaded * LOAD_CYCLES_PER_BYTE
            + self.bytes_stored * STORE_CYCLES_PER_BYTE
            + self.compute_cycles
    }
}

/// Handle to the shared pool. Cheap to copy; carries only the requested degree.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPool {
    par: Par,
    min_block_cost: f64,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ThreadPool {
    /// Single-threaded pool; every parallel-for runs inline.
    pub fn sequential() -> Self {
        Self {
            par: Par::Seq,
            min_block_cost: env::min_parallel_cost(),
        }
    }

    /// Pool with an explicit degree of parallelism. `0` and `1` both mean sequential.
    pub fn with_threads(threads: usize) -> Self {
        let par = match NonZeroUsize::new(threads) {
            Some(n) if n.get() > 1 => Par::Rayon(n),
            _ => Par::Seq,
        };
        Self {
            par,
            min_block_cost: env::min_parallel_cost(),
        }
    }

    /// Honors `UNPOOL_NUM_THREADS`, falling back to faer's global parallelism.
    pub fn from_env() -> Self {
        match env::num_threads() {
            Some(threads) => Self::with_threads(threads),
            None => {
                let par = faer::get_global_parallelism();
                Self::with_threads(par.degree())
            }
        }
    }

    /// Overrides the partition cost threshold.
    pub fn with_min_block_cost(mut self, cost: f64) -> Self {
        if cost.is_finite() && cost > 0.0 {
            self.min_block_cost = cost;
        }
        self
    }

    pub fn degree(&self) -> usize {
        self.par.degree()
    }

    pub fn par(&self) -> Par {
        self.par
    }

    /// Number of rows a single partition should cover for the given per-row cost.
    pub fn block_rows(&self, cost_per_row: &TensorOpCost) -> usize {
        let cycles = cost_per_row.total_cycles();
        if cycles <= 0.0 {
            return usize::MAX;
        }
        let rows = (self.min_block_cost / cycles).ceil();
        if rows >= usize::MAX as f64 {
            usize::MAX
        } else {
            (rows as usize).max(1)
        }
    }

    /// Runs `process(row_start, row_end, out_rows)` over `[0, rows)` in contiguous partitions.
    ///
    /// `out` is split so every partition receives exactly the `row_width * (row_end -
    /// row_start)` elements that belong to its rows. Partitions run on the pool when the degree
    /// is above one and the estimated cost justifies splitting. The first error wins.
    pub fn parallel_for_rows<T, F>(
        &self,
        rows: usize,
        row_width: usize,
        cost_per_row: TensorOpCost,
        out: &mut [T],
        process: &F,
    ) -> Result<()>
    where
        T: Send,
        F: Fn(usize, usize, &mut [T]) -> Result<()> + Send + Sync,
    {
        debug_assert_eq!(out.len(), rows * row_width);
        let block_rows = self.block_rows(&cost_per_row);
        split_rows(self.par, 0, rows, row_width, block_rows, out, process)
    }
}

fn split_rows<T, F>(
    par: Par,
    row_start: usize,
    row_end: usize,
    row_width: usize,
    block_rows: usize,
    out: &mut [T],
    process: &F,
) -> Result<()>
where
    T: Send,
    F: Fn(usize, usize, &mut [T]) -> Result<()> + Send + Sync,
{
    let rows = row_end - row_start;
    if rows == 0 {
        return Ok(());
    }

    if par.degree() <= 1 || rows <= block_rows {
        return process(row_start, row_end, out);
    }

    let mid = row_start + rows / 2;
    let (out_left, out_right) = out.split_at_mut((mid - row_start) * row_width);
    let mut left_res: Result<()> = Ok(());
    let mut right_res: Result<()> = Ok(());

    faer::utils::thread::join_raw(
        |par_left| {
            left_res = split_rows(
                par_left, row_start, mid, row_width, block_rows, out_left, process,
            )
        },
        |par_right| {
            right_res = split_rows(
                par_right, mid, row_end, row_width, block_rows, out_right, process,
            )
        },
        par,
    );

    left_res?;
    right_res?;
    Ok(())
}

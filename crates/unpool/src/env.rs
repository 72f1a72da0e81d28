use std::env;
use std::sync::OnceLock;

static UNPOOL_NUM_THREADS: OnceLock<Option<usize>> = OnceLock::new();
static UNPOOL_ENGINE: OnceLock<String> = OnceLock::new();
static UNPOOL_MIN_PARALLEL_COST: OnceLock<f64> = OnceLock::new();

/// Engine looked up by [`crate::MaxUnpool::with_default_engine`] when `UNPOOL_ENGINE` is unset.
pub const DEFAULT_ENGINE: &str = "reference";

/// Partition cost (in estimated cycles) below which the parallel-for stops splitting.
pub const DEFAULT_MIN_PARALLEL_COST: f64 = 50_000.0;

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Thread count requested through `UNPOOL_NUM_THREADS`, if any.
pub fn num_threads() -> Option<usize> {
    *UNPOOL_NUM_THREADS.get_or_init(|| match env::var("UNPOOL_NUM_THREADS") {
        Ok(value) => parse_usize(&value),
        Err(_) => None,
    })
}

pub fn engine_name() -> &'static str {
    UNPOOL_ENGINE.get_or_init(|| match env::var("UNPOOL_ENGINE") {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => DEFAULT_ENGINE.to_string(),
    })
}

pub fn min_parallel_cost() -> f64 {
    *UNPOOL_MIN_PARALLEL_COST.get_or_init(|| match env::var("UNPOOL_MIN_PARALLEL_COST") {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|cost| cost.is_finite() && *cost > 0.0)
            .unwrap_or(DEFAULT_MIN_PARALLEL_COST),
        Err(_) => DEFAULT_MIN_PARALLEL_COST,
    })
}

use crate::model::error::CwmError;

/// Build a scoped thread pool for one batch of permutation draws. The pool
/// lives for the duration of a single call, never process-wide.
pub fn create_pool(num_threads: usize) -> Result<rayon::ThreadPool, CwmError> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Err(e) => Err(CwmError::RayonError(e)),
        Ok(pool) => Ok(pool),
    }
}

//! Batch job dispatch for the per-image worker phases.
//!
//! Each phase (mask generation, intensity sampling, reference tiling,
//! propagation) submits a batch of independent jobs, waits for all of them,
//! and collects the results in submission order so the final stable sort is
//! deterministic. Jobs are pure functions of their argument tuple: each reads
//! its own inputs and writes its own output file, so there is no shared
//! mutable state between workers. A failing job aborts the whole phase; the
//! consolidated metadata table for a phase is only written by the caller
//! after every job has returned.

use rayon::prelude::*;

use crate::errors::PreprocessError;

/// Execution strategy for a batch of independent jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobRunner {
    /// Deterministic single-threaded execution, used in tests
    Serial,
    /// Rayon worker pool (bounded by the global thread pool)
    #[default]
    Parallel,
}

impl JobRunner {
    /// Run every job, collecting results in submission order. The first
    /// error aborts the phase.
    pub fn run_batch<A, R, F>(&self, args: Vec<A>, job: F) -> Result<Vec<R>, PreprocessError>
    where
        A: Send,
        R: Send,
        F: Fn(A) -> Result<R, PreprocessError> + Sync + Send,
    {
        match self {
            JobRunner::Serial => args.into_iter().map(job).collect(),
            JobRunner::Parallel => args.into_par_iter().map(job).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_come_back_in_submission_order() {
        let args: Vec<u32> = (0..64).collect();
        let doubled = JobRunner::Parallel
            .run_batch(args.clone(), |v| Ok(v * 2))
            .unwrap();
        assert_eq!(doubled, args.iter().map(|v| v * 2).collect::<Vec<_>>());
    }

    #[test]
    fn a_failing_job_aborts_the_phase() {
        let args: Vec<u32> = (0..8).collect();
        let result = JobRunner::Serial.run_batch(args, |v| {
            if v == 3 {
                Err(PreprocessError::MaskComputation("degenerate".to_string()))
            } else {
                Ok(v)
            }
        });
        assert!(result.is_err());
    }
}

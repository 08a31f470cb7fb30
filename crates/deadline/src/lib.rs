//! Single-attempt operations raced against a deadline.
//!
//! The unit of work runs on its own tokio task while the caller waits at most
//! `budget` for it. Whichever comes first wins: the work's success, its
//! failure, or the deadline. On expiry the task is aborted, so it stops at its
//! next await point and its result is never observed.

use log::warn;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum RaceError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("{label}: deadline of {budget:?} exceeded")]
    DeadlineExceeded {
        label: &'static str,
        budget: Duration,
    },
    #[error("{label}: worker task did not finish: {source}")]
    Worker {
        label: &'static str,
        source: JoinError,
    },
}

impl<E> RaceError<E> {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RaceError::DeadlineExceeded { .. })
    }
}

pub async fn race<T, E, F>(
    label: &'static str,
    budget: Duration,
    work: F,
) -> Result<T, RaceError<E>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut worker = tokio::spawn(work);

    match tokio::time::timeout(budget, &mut worker).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(RaceError::Failed(e)),
        Ok(Err(source)) => Err(RaceError::Worker { label, source }),
        Err(_) => {
            worker.abort();
            warn!("{} | deadline of {:?} exceeded", label, budget);
            Err(RaceError::DeadlineExceeded { label, budget })
        }
    }
}

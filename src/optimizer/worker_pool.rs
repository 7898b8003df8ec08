//! # Worker Pool
//!
//! Pool a dimensione fissa per job CPU-bound e indipendenti.
//!
//! ## Responsabilità:
//! - Al massimo `concurrency` job in esecuzione contemporaneamente
//! - Risultati consegnati in ordine di completamento, non di sottomissione
//! - Ogni risultato porta l'indice di sottomissione
//! - Un job che va in panic produce un errore per quel solo job
//!
//! I job girano su `spawn_blocking`: decode, resize e attesa dei processi
//! esterni non bloccano mai il runtime async.

use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinError;

/// A job that did not return normally
#[derive(Debug, Clone, thiserror::Error)]
#[error("worker panicked: {message}")]
pub struct JobPanicked {
    pub message: String,
}

impl From<JoinError> for JobPanicked {
    fn from(err: JoinError) -> Self {
        if !err.is_panic() {
            return Self {
                message: err.to_string(),
            };
        }

        let payload = err.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// Pool running at most `concurrency` jobs at once (at least one).
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `job` over every item, yielding `(submission_index, result)` as jobs finish.
    pub fn map_unordered<T, R, F>(
        &self,
        items: Vec<T>,
        job: F,
    ) -> impl Stream<Item = (usize, Result<R, JobPanicked>)>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let job = Arc::new(job);

        stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| {
                let job = Arc::clone(&job);
                async move {
                    let result = tokio::task::spawn_blocking(move || job(item))
                        .await
                        .map_err(JobPanicked::from);
                    (index, result)
                }
            })
            .buffer_unordered(self.concurrency)
    }
}

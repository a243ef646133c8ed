//! Bounded fan-out / fan-in over async jobs
//!
//! At most `width` jobs are polled concurrently; results come back in
//! completion order. The pool returns only after every job has finished.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Worker pool parameterized by concurrency width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPool {
    width: usize,
}

impl BoundedPool {
    /// Widths below 1 are raised to 1
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `job` over every item and collect all results
    pub async fn run_all<I, F, Fut, T>(&self, items: I, job: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items)
            .map(job)
            .buffer_unordered(self.width)
            .collect()
            .await
    }
}

//! Cooperative work queue for long operations.
//!
//! The host pulls one item at a time (typically from a timer), runs it and
//! redraws its progress bar from [`WorkQueue::progress`] and the label of
//! the item in flight.

use std::collections::VecDeque;

/// A unit of queued work.
pub trait WorkItem {
    /// Progress label shown while the item runs.
    fn description(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct WorkQueue<T> {
    pending: VecDeque<T>,
    total: usize,
    current: Option<String>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            total: 0,
            current: None,
        }
    }
}

impl<T: WorkItem> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let pending: VecDeque<T> = items.into_iter().collect();
        Self {
            total: pending.len(),
            pending,
            current: None,
        }
    }

    pub fn push(&mut self, item: T) {
        self.pending.push_back(item);
        self.total += 1;
    }

    /// Items not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fraction of items handed out, in `[0, 1]`. An empty queue is done.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.pending.len()) as f64 / self.total as f64
    }

    /// Label of the item most recently handed out.
    pub fn description(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Drop everything still pending.
    pub fn cancel(&mut self) {
        if !self.pending.is_empty() {
            log::info!("cancelled {} queued item(s)", self.pending.len());
        }
        self.pending.clear();
        self.current = None;
    }

    /// Run every pending item through `step`, stopping at the first error.
    pub fn run<F, E>(&mut self, mut step: F) -> Result<usize, E>
    where
        F: FnMut(T) -> Result<(), E>,
    {
        let mut done = 0;
        while let Some(item) = self.next() {
            step(item)?;
            done += 1;
        }
        Ok(done)
    }
}

impl<T: WorkItem> Iterator for WorkQueue<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.pending.pop_front()?;
        let label = item.description();
        log::debug!("{label}");
        self.current = Some(label);
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Step(&'static str);

    impl WorkItem for Step {
        fn description(&self) -> String {
            format!("{} ...", self.0)
        }
    }

    #[test]
    fn progress_counts_handed_out_items() {
        let mut queue = WorkQueue::new([Step("a"), Step("b"), Step("c"), Step("d")]);
        assert_eq!(queue.progress(), 0.0);
        assert!(queue.description().is_none());

        queue.next();
        assert_eq!(queue.progress(), 0.25);
        assert_eq!(queue.description(), Some("a ..."));

        queue.push(Step("e"));
        assert_eq!(queue.total(), 5);
        assert_eq!(queue.remaining(), 4);
        assert_eq!(queue.progress(), 0.2);
    }

    #[test]
    fn run_stops_on_first_error() {
        let mut queue = WorkQueue::new([Step("a"), Step("boom"), Step("c")]);
        let result = queue.run(|step| if step.0 == "boom" { Err("failed") } else { Ok(()) });
        assert_eq!(result, Err("failed"));
        assert_eq!(queue.remaining(), 1);

        queue.cancel();
        assert!(queue.is_done());
        assert_eq!(queue.progress(), 1.0);
    }

    #[test]
    fn empty_queue_is_complete() {
        let mut queue: WorkQueue<Step> = WorkQueue::default();
        assert_eq!(queue.progress(), 1.0);
        assert!(queue.next().is_none());
    }
}

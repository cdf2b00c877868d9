//! Bounded fork-join fan-out over async tasks.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Worker count for a batch of `items` tasks capped at `cap`, never zero.
#[must_use]
pub fn pool_size(items: usize, cap: usize) -> usize {
    items.min(cap).max(1)
}

/// Runs `task` for every item with at most `min(len, cap)` in flight and
/// waits for all of them. Results arrive in completion order.
pub async fn fan_out<I, F, Fut, T>(items: I, cap: usize, task: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let tasks: Vec<I::Item> = items.into_iter().collect();
    let limit = pool_size(tasks.len(), cap);
    stream::iter(tasks)
        .map(task)
        .buffer_unordered(limit)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    //! Unit tests for the fan-out primitive.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(3, 10, 3)]
    #[case(12, 10, 10)]
    #[case(0, 5, 1)]
    fn pool_size_is_bounded(#[case] items: usize, #[case] cap: usize, #[case] expected: usize) {
        assert_eq!(pool_size(items, cap), expected);
    }

    #[tokio::test]
    async fn collects_every_result() {
        let mut results = fan_out(0..8_u32, 3, |value| async move { value * 2 }).await;
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test]
    async fn never_exceeds_the_cap() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let results = fan_out(0..12, 4, |_| {
            let active_count = Arc::clone(&active);
            let peak_count = Arc::clone(&peak);
            async move {
                let now = active_count.fetch_add(1, Ordering::SeqCst) + 1;
                peak_count.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active_count.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }
}

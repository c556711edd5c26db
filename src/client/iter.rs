use std::iter::FusedIterator;

use super::MetricClient;

/// Counted iteration `0..n` with remote progress tracking.
///
/// Created by [`MetricClient::iter`]. The internal `<metric>_epochs` param is
/// recorded before the iterator exists; each yielded index emits the internal
/// metric `<metric>`, rate-limited like any other metric except for the last
/// index, which is always sent.
pub struct Iter {
    client: MetricClient,
    metric: String,
    total: u64,
    next: u64,
    log: bool,
}

impl Iter {
    pub(crate) fn new(client: MetricClient, metric: String, total: u64, log: bool) -> Self {
        Self {
            client,
            metric,
            total,
            next: 0,
            log,
        }
    }

    /// Name of the internal progress metric (`hd_iter_<k>`).
    pub fn metric_name(&self) -> &str {
        &self.metric
    }
}

impl Iterator for Iter {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.total {
            return None;
        }
        let i = self.next;
        self.next += 1;

        if self.log {
            self.client
                .write_line(&format!("| Iteration {} of {} |", i, self.total - 1));
        }
        self.client
            .emit_internal_metric(&self.metric, i as f64, self.next == self.total);
        Some(i)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.total - self.next).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

impl FusedIterator for Iter {}

use metrics::{Counter, Histogram};
use std::fmt;
use txflow_primitives::ReceiptStatus;

/// Transaction executor metrics.
#[derive(Clone)]
pub(crate) struct ExecutorMetrics {
    /// Finalized transactions.
    pub(crate) transactions: Counter,
    /// Receipts with [`ReceiptStatus::Revert`].
    pub(crate) reverted: Counter,
    /// Receipts with [`ReceiptStatus::InternalError`].
    pub(crate) internal_errors: Counter,
    /// Gas used per transaction.
    pub(crate) gas_used: Histogram,
}

impl ExecutorMetrics {
    pub(crate) fn record(&self, status: ReceiptStatus, gas_used: u64) {
        self.transactions.increment(1);
        match status {
            ReceiptStatus::Success => {}
            ReceiptStatus::Revert => self.reverted.increment(1),
            ReceiptStatus::InternalError => self.internal_errors.increment(1),
        }
        self.gas_used.record(gas_used as f64);
    }
}

impl Default for ExecutorMetrics {
    fn default() -> Self {
        Self {
            transactions: metrics::counter!("txflow.executor.transactions"),
            reverted: metrics::counter!("txflow.executor.reverted"),
            internal_errors: metrics::counter!("txflow.executor.internal_errors"),
            gas_used: metrics::histogram!("txflow.executor.gas_used"),
        }
    }
}

impl fmt::Debug for ExecutorMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorMetrics").finish_non_exhaustive()
    }
}

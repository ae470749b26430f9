use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Total requests served by the target endpoints.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter(Arc<AtomicU64>);

impl RequestCounter {
    /// Count one request and return its sequence number, starting at 1.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetState {
    pub requests: RequestCounter,
}

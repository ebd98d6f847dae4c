/// Default number of undelivered messages a subscription buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 6;

/// Controls subscription queue behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Entries buffered per subscription before the oldest is evicted.
    /// Values below 1 are treated as 1.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

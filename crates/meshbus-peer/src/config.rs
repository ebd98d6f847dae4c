use meshbus_dispatch::{DispatchConfig, DEFAULT_QUEUE_CAPACITY};

/// Discovery namespace used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "meshbus";

/// Configuration for a [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Discovery namespace; only peers sharing it connect.
    pub service_name: String,
    /// Display name for the local identity. Defaults to its UUID string.
    pub display_name: Option<String>,
    /// Entries buffered per subscription before the oldest is evicted.
    pub queue_capacity: usize,
}

impl BusConfig {
    pub fn with_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            display_name: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

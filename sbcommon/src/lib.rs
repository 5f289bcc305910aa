//! Shared utilities and strongly-typed common values for workspace crates.
//!
//! ```rust
//! use sbcommon::{IdGenerator, MetadataMap};
//!
//! let ids = IdGenerator::deterministic("test");
//! let mut metadata = MetadataMap::new();
//! metadata.insert("tenant".to_string(), "acme".to_string());
//!
//! assert_eq!(ids.next("msg"), "msg-test-0-1");
//! assert_eq!(ids.next("msg"), "msg-test-0-2");
//! ```

pub mod future {
    //! Shared async future aliases.
    //!
    //! ```rust
    //! use sbcommon::BoxFuture;
    //!
    //! fn str_len<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.len() })
    //! }
    //!
    //! let _future = str_len("hello");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod context {
    //! Shared metadata map used by messages, configs, and capability tables.
    //!
    //! ```rust
    //! use sbcommon::MetadataMap;
    //!
    //! let mut metadata = MetadataMap::new();
    //! metadata.insert("env".to_string(), "test".to_string());
    //! assert_eq!(metadata.get("env").map(String::as_str), Some("test"));
    //! ```

    use std::collections::HashMap;

    pub type MetadataMap = HashMap<String, String>;
}

pub mod ids {
    //! Centralized identifier and timestamp generation.
    //!
    //! Every generated identifier in the workspace flows through one
    //! [`IdGenerator`] injected at construction time, so tests can substitute
    //! a deterministic generator and assert exact values.
    //!
    //! ```rust
    //! use sbcommon::IdGenerator;
    //!
    //! let ids = IdGenerator::new("sw");
    //! let first = ids.next("req");
    //! let second = ids.next("req");
    //! assert_ne!(first, second);
    //! assert!(first.starts_with("req-sw-"));
    //! ```

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ClockMode {
        Wallclock,
        Fixed(u64),
    }

    /// Process-unique id source: a namespace prefix, an epoch captured at
    /// construction, and a monotonically increasing sequence counter.
    #[derive(Debug)]
    pub struct IdGenerator {
        prefix: String,
        epoch_ms: u64,
        sequence: AtomicU64,
        clock: ClockMode,
    }

    impl IdGenerator {
        pub fn new(prefix: impl Into<String>) -> Self {
            let epoch_ms = wallclock_ms();
            Self {
                prefix: prefix.into(),
                epoch_ms,
                sequence: AtomicU64::new(0),
                clock: ClockMode::Wallclock,
            }
        }

        /// Generator with a zeroed epoch and a fixed timestamp, for tests
        /// that assert exact identifier values.
        pub fn deterministic(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                epoch_ms: 0,
                sequence: AtomicU64::new(0),
                clock: ClockMode::Fixed(0),
            }
        }

        /// Next identifier in the `<kind>-<prefix>-<epoch>-<sequence>` shape.
        pub fn next(&self, kind: &str) -> String {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            format!("{kind}-{}-{}-{sequence}", self.prefix, self.epoch_ms)
        }

        /// Current wall-clock timestamp in milliseconds, or the fixed value
        /// for deterministic generators.
        pub fn timestamp_ms(&self) -> u64 {
            match self.clock {
                ClockMode::Wallclock => wallclock_ms(),
                ClockMode::Fixed(value) => value,
            }
        }
    }

    impl Default for IdGenerator {
        fn default() -> Self {
            Self::new("sw")
        }
    }

    fn wallclock_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub use context::MetadataMap;
pub use future::BoxFuture;
pub use ids::IdGenerator;

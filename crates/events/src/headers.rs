//! Bus message header names.
//!
//! Consumers rely on `event-id` for deduplication; a message without it
//! cannot be deduplicated and is dropped.

pub const EVENT_ID: &str = "event-id";
pub const EVENT_TYPE: &str = "event-type";
pub const EVENT_VERSION: &str = "event-version";
pub const CORRELATION_ID: &str = "correlation-id";
pub const CAUSATION_ID: &str = "causation-id";

/// Scripted in-memory session for exercising the adapter without a server
pub mod fake;

/// Test utilities for `PostgreSQL` testing
#[cfg(feature = "test-utils-postgres")]
pub mod postgres;

pub use fake::{Call, CallLog, FakeHandle};

//! emberlib-test-harness: deterministic provider doubles for tests.
//!
//! [`MockProvider`] is a scripted Ember+ provider on a localhost TCP
//! listener, enabling protocol-level testing of the consumer and pool
//! layers without real broadcast hardware.

pub mod mock_provider;

pub use mock_provider::MockProvider;

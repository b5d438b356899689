//! emberlib-transport: transport implementations for emberlib.
//!
//! Ember+ providers listen on plain TCP; [`TcpTransport`] is the production
//! implementation of the core
//! [`Transport`](emberlib_core::transport::Transport) trait. Tests use the
//! scripted provider from `emberlib-test-harness` instead of real devices.

pub mod tcp;

pub use tcp::TcpTransport;

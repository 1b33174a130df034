//! Inbound adapters that receive calls from other services.
//!
//! HTTP middleware and error mapping live under [`http`].

pub mod http;

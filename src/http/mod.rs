//! HTTP exchanges with connection-level retry.

mod client;
mod exchange;

pub use client::HttpTransport;
pub use exchange::{ExchangeRequest, RequestBody, Transport};

#[cfg(test)]
pub use exchange::MockTransport;

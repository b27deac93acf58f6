#![forbid(unsafe_code)]

//! HTTP transport layer: the [`Net`] trait, a reqwest-backed [`HttpClient`],
//! and retry/timeout decorators.
//!
//! Everything above this crate talks to the network through [`Net`], so tests
//! substitute a mock (enable the `mock` feature for [`mock::NetMock`]).

mod client;
mod error;
mod retry;
mod timeout;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use retry::{DefaultRetryPolicy, RetryDecider, RetryNet};
pub use timeout::TimeoutNet;
pub use traits::{ByteStream, Net, NetExt, NetResponse};
pub use types::{BasicCredentials, Headers, NetOptions, RangeSpec, RetryPolicy};

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    pub use crate::traits::NetMock;
}

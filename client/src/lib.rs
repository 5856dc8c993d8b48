//! Client runtime for observing Exosphere runs.
//!
//! # Architecture
//!
//! Two independent consumption modes over the same remote run, plus one
//! shared utility:
//!
//! - [`await_run`] - poll a run until it reaches a terminal status, with a
//!   deadline and an optional per-poll update callback
//! - [`stream_run_events`] - open one long-lived streaming connection and
//!   decode the blank-line-delimited event protocol into
//!   [`RunEvent`](exosphere_types::RunEvent)s,
//!   invoking a callback per event in strict arrival order
//! - [`merge_cancellations`] - fan N independent cancellation tokens into
//!   one derived token, used by both modes to bound request lifetime
//!
//! Both modes talk to the service through [`ExosphereClient`], which owns
//! authentication and the connection pool. Neither mode retries, persists
//! events, or reorders anything; callers wanting resilience wrap the calls
//! themselves.
//!
//! # Error Handling
//!
//! Everything surfaces as [`ClientError`]. A non-success response when
//! opening a stream is always a hard failure carrying status, status text,
//! and a body excerpt; faults after a successful open can be intercepted
//! with [`StreamRunOptions::with_on_error`], in which case the stream call
//! resolves normally. Cleanup (dropping the stream handle, firing the
//! internally owned cancellation) runs on every exit path before any error
//! is returned.
//!
//! # Example
//!
//! ```no_run
//! use exosphere_client::{
//!     await_run, AwaitRunOptions, ClientConfig, ExosphereClient,
//! };
//! use exosphere_types::RunId;
//!
//! # async fn demo() -> Result<(), exosphere_client::ClientError> {
//! let client = ExosphereClient::new(ClientConfig::new("api-key"))?;
//! let run = await_run(
//!     &client,
//!     &RunId::from("run-123"),
//!     AwaitRunOptions::new().with_on_update(|run| println!("{}", run.status)),
//! )
//! .await?;
//! println!("finished: {}", run.status);
//! # Ok(())
//! # }
//! ```

mod awaiter;
mod cancel;
mod client;
mod error;
mod sse;
mod stream;

pub use awaiter::{await_run, AwaitRunOptions, OnUpdate, MIN_POLL_INTERVAL};
pub use cancel::merge_cancellations;
pub use client::{ClientConfig, ExosphereClient, DEFAULT_BASE_URL};
pub use error::ClientError;
pub use stream::{stream_run_events, OnStreamError, PayloadParser, StreamRunOptions};

pub use exosphere_types as types;
pub use tokio_util::sync::CancellationToken;

//! # embedcss-worker
//!
//! A long-running compiler worker driven by a host bundler over a binary
//! stdio protocol. The host sends length-prefixed request packets, the worker
//! dispatches them to registered commands and answers with correlated
//! response packets, and a heartbeat lets the worker notice a dead host and
//! stop itself.
//!
//! ## Architecture
//!
//! - [`protocol`] — tagged binary value codec, frame extraction, packet model
//! - [`handler`] — command table (frozen before the service starts)
//! - [`writer`] — single writer task serializing all output
//! - [`service`] — read loop, dispatch, response correlation, heartbeat
//! - [`compiler`] — the `compile` command: CSS-in-JS source rewriting
//!
//! ## Example
//!
//! ```ignore
//! use embedcss_worker::compiler::compile_command;
//! use embedcss_worker::service::ServiceBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let status = ServiceBuilder::new()
//!         .command("compile", compile_command)
//!         .serve(tokio::io::stdin(), tokio::io::stdout())
//!         .await;
//!     std::process::exit(status);
//! }
//! ```

pub mod compiler;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod service;
pub mod writer;

pub use error::{CommandError, DecodeError, Result, WorkerError};
pub use protocol::{Packet, Request, Value};
pub use service::{ServiceBuilder, EXIT_CLEAN, EXIT_FATAL};

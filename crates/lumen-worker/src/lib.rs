//! Lumen REPL worker host.
//!
//! Message-driven host for the build pipeline: each `update` message
//! triggers a full rebuild, results flow back as `result` messages, and
//! compiled client artifacts are served through a fetch-interception
//! layer.

pub mod fetch;
pub mod protocol;
pub mod worker;

pub use fetch::intercept;
pub use protocol::{WorkerRequest, WorkerResponse};
pub use worker::{ReplWorker, WorkerHandle, channel, coalesce};

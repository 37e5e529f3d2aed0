//! # linkwatch-types
//!
//! Core types for telemetry link testing. This crate defines the plain data
//! shared between the codec, the link monitor engine and anything consuming
//! its output: connection descriptors, decoded protocol messages, per-second
//! metrics records and the final per-link report.
//!
//! ## Design Goals
//!
//! - **No runtime dependencies**: Types work without an async runtime or codec
//! - **Optional serialization**: Enable the `serde` feature to serialize
//!   records and reports (e.g. to JSON)
//! - **Transport agnostic**: A [`Message`] looks the same whether it arrived
//!   over UDP, TCP or a serial radio
//!
//! ## Example
//!
//! ```rust
//! use linkwatch_types::{LinkDescriptor, LinkIdentity};
//!
//! let descriptor: LinkDescriptor = "udpin:0.0.0.0:14550".parse().unwrap();
//! assert!(descriptor.is_listener());
//!
//! let identity = LinkIdentity::new(0, "udpin:0.0.0.0:14550");
//! assert_eq!(identity.sanitized, "udpin_0_0_0_0_14550");
//! ```

mod descriptor;
mod histogram;
mod message;
mod metrics;

pub use descriptor::*;
pub use histogram::*;
pub use message::*;
pub use metrics::*;

//! # Sluice
//!
//! A graph-structured media pipeline runtime with an H.265-over-RTP stack
//! built on top of it.
//!
//! Independent elements (sources, filters, sinks) communicate exclusively
//! via typed asynchronous buffer streams and are wired into a directed
//! acyclic dataflow graph that the runtime drives: one worker task per
//! connected edge, back-pressure by awaiting the downstream handler, and
//! cooperative cancellation on teardown.
//!
//! ## Features
//!
//! - **Typed pads**: edge type agreement checked when the edge is created
//! - **Schema groups**: linear wiring inside groups, fan-out by reference
//! - **Dynamic mutation**: add and remove elements while running
//! - **RFC 7798**: H.265 packetization and reassembly, parameter-set codec
//! - **RFC 3550**: RTP/UDP sending with periodic sender reports
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//! use sluice::elements::{RtpH265Pay, TestSrc};
//! use sluice::h265::Packetizer;
//! use sluice::net::RtpUdpSink;
//!
//! let pipeline = Pipeline::new();
//! pipeline.build_linear(vec![
//!     Child::filter(pay.clone()),
//!     Child::sink(net.clone()),
//! ]).await?;
//!
//! pipeline.wait_for_completion().await;
//! pipeline.stop().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod element;
pub mod elements;
pub mod error;
pub mod h265;
pub mod net;
pub mod pipeline;
pub mod schema;
pub mod time;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::buffer::{Buffer, BufferStream};
    pub use crate::element::{Element, Filter, PadRef, Sink, Source};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{Pipeline, PipelineStatus};
    pub use crate::schema::{Child, EdgeId, Group};
    pub use crate::time::MediaTime;
}

pub use error::{Error, Result};

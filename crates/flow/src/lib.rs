//! Supervised task groups and a composable dataflow fabric.
//!
//! - [`group`]: tasks forked under one cancellation context, with census,
//!   fail-fast error propagation and closers
//! - [`stream`]: bounded, addressable FIFO conduits
//! - [`segment`]: units of work reading outlets and writing inlets
//! - [`pipeline`]: addressed registry of segments wired by routers

pub mod error;
pub mod group;
pub mod pipeline;
pub mod segment;
pub mod stream;

pub use error::{BoxError, ContractViolation, FlowError, Role, Side, TransportError};
pub use group::{ForkOptions, Routine, TaskContext, TaskGroup};
pub use pipeline::{Pipeline, Route, Router, Stitch};
pub use segment::{Flow, FlowOptions, Segment, Sink, Source};
pub use sluice_core::{Address, AddressError};
pub use stream::{ElasticStream, Inlet, Outlet, Stream};

//! Typed peer-network events.
//!
//! Every occurrence a node observes is an [`Event`]: who it concerns
//! (peer UUID, name, headers) plus an [`EventKind`] carrying exactly the
//! fields that kind requires. Events come from two places:
//!
//! - [`classify`], which turns a transport's [`RawOccurrence`] into an
//!   event;
//! - [`synthesize`] / [`Event::build`], which assemble events from loose
//!   [`Fields`] for tests and replay.
//!
//! [`Criteria`] test events against attribute values, and the
//! [`testing`] module fabricates realistic events.

pub mod criteria;
pub mod event;
pub mod kind;
pub mod raw;
pub mod synth;
pub mod testing;

pub use criteria::{Criteria, Criterion};
pub use event::{Event, EventKind, Message};
pub use kind::EventType;
pub use raw::{classify, RawOccurrence};
pub use synth::{synthesize, Fields};

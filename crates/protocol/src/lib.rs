//! Session protocol: the event envelope wire format and its catalog.
//!
//! Every message exchanged with a client is one [`Envelope`] — a
//! self-describing event carrying an id, a dotted type tag, a timestamp,
//! a session id, and a JSON-object payload. The codec here is the only
//! place envelope shape is enforced; everything downstream works with
//! already-validated values.

pub mod envelope;
pub mod events;

pub use envelope::{Envelope, EnvelopeError};
pub use events::{codes, tools, EventKind};

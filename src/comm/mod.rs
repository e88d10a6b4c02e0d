//! Process topology and message passing.
//!
//! The engines are written against the [`Communicator`] trait and never against a concrete
//! transport. Two transports ship with the crate:
//!
//! - [`LocalWorld`] runs an SPMD computation on one thread per rank, wired with `crossbeam`
//!   channels.
//! - [`SerialComm`] is the single-process communicator.

mod backend;
mod local;
mod serial;

pub use backend::{Communicator, SendRequest, message_tag};
pub use local::{LocalComm, LocalRequest, LocalWorld};
pub use serial::{SerialComm, SerialRequest};

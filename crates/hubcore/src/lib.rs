//! # Hubcore
//!
//! A small hub-style remote invocation core: clients call named server methods,
//! the server answers with nothing, a single value, or a stream of values, and may
//! push invocations back to the caller or to every connected client.
//!
//! ## Architecture
//!
//! - **Registry**: methods are declared once at startup with their parameter shapes
//!   and result kind (`registry`).
//! - **Dispatcher**: inbound invocations are validated, executed, and answered (`hub`).
//! - **Streams**: producers push into a queue drained by a per-session pump (`stream`).
//! - **Send Path**: caller-directed and broadcast delivery over registered
//!   connections (`clients`, `connection`).
//!
//! The transport is an external collaborator: it calls `Hub::on_connect`,
//! `Hub::on_invocation`, `Hub::on_cancel` and `Hub::on_disconnect`, and provides a
//! `Connection` per client.

pub mod clients;
pub mod connection;
pub mod context;
pub mod error;
pub mod hub;
pub mod mock;
pub mod registry;
pub mod stream;
pub mod value;

pub use clients::Clients;
pub use connection::{Completion, Connection, ConnectionId, ConnectionRegistry, Message};
pub use context::HubContext;
pub use error::{Error, Failure, FailureKind, Result};
pub use hub::{Dispatched, Hub, Invocation};
pub use registry::{MethodBody, MethodDescriptor, MethodRegistry, ResultKind};
pub use stream::{Capacity, StreamReader, StreamWriter};
pub use value::{Args, FromValue, IntoValue, Type, Value};

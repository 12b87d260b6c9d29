//! # Hubapps
//!
//! The hubs served by `hubd`, expressed as method registrations on `hubcore`.
//!
//! - **Chat**: `Send(name, message)` relays `OnMessage(name, message)` to everyone.
//! - **Integration Test**: one method per invocation pattern a client library
//!   must support, including a counter stream.

pub mod chat;
pub mod integration;
pub mod payload;

use hubcore::MethodRegistry;

/// Methods of the chat hub.
pub fn chat_hub() -> hubcore::Result<MethodRegistry> {
    let mut methods = MethodRegistry::new();
    chat::register(&mut methods)?;
    Ok(methods)
}

/// Methods of the integration-test hub.
pub fn integration_test_hub() -> hubcore::Result<MethodRegistry> {
    let mut methods = MethodRegistry::new();
    integration::register(&mut methods)?;
    Ok(methods)
}

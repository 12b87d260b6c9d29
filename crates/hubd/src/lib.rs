//! # Hubd
//!
//! Process bootstrap for the hubs in `hubapps`: configuration, a TCP listener,
//! and the framing that turns socket bytes into hub invocations and back.

pub mod config;
pub mod protocol;
pub mod server;

use hubcore::Hub;

use crate::config::HubKind;

/// Builds the hub selected by `kind`.
pub fn build_hub(kind: HubKind) -> hubcore::Result<Hub> {
    let methods = match kind {
        HubKind::Chat => hubapps::chat_hub()?,
        HubKind::IntegrationTest => hubapps::integration_test_hub()?,
    };
    Ok(Hub::new(methods))
}

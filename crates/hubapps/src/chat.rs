//! The chat hub: one method that relays a message to every connected client.

use hubcore::Args;
use hubcore::HubContext;
use hubcore::MethodRegistry;
use hubcore::Type;
use hubcore::Value;

/// Client method invoked on every connection when someone sends a message.
pub const ON_MESSAGE: &str = "OnMessage";

pub fn register(methods: &mut MethodRegistry) -> hubcore::Result<()> {
    methods.register_action("Send", vec![Type::String, Type::String], send)
}

async fn send(ctx: HubContext, args: Args) -> anyhow::Result<()> {
    let name: String = args.get(0)?;
    let message: String = args.get(1)?;

    let delivered = ctx.send_to_all(ON_MESSAGE, vec![Value::String(name.clone()), Value::String(message)]).await;
    tracing::info!(connection = %ctx.caller(), name = %name, delivered, "chat message relayed");
    Ok(())
}

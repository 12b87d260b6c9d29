//! The integration-test hub.
//!
//! Covers each combination a client library needs to exercise: calls with and
//! without parameters and return values, a record round-trip, server-to-caller
//! invocations, and a server-to-client stream.

use std::time::Duration;

use hubcore::Args;
use hubcore::Capacity;
use hubcore::HubContext;
use hubcore::MethodRegistry;
use hubcore::StreamReader;
use hubcore::StreamWriter;
use hubcore::Type;
use hubcore::Value;
use hubcore::stream;

use crate::payload::Greeting;
use crate::payload::PersonName;

pub const NO_PARAMETERS_NO_RETURN: &str = "MethodNoParametersNoReturnValue";
pub const NO_PARAMETERS_SIMPLE_RETURN: &str = "MethodNoParametersSimpleReturnValue";
pub const ONE_PARAMETER_NO_RETURN: &str = "MethodOneSimpleParameterNoReturnValue";
pub const ONE_PARAMETER_SIMPLE_RETURN: &str = "MethodOneSimpleParameterSimpleReturnValue";
pub const COMPLEX_PARAMETER_COMPLEX_RETURN: &str = "MethodWithComplexParameterAndComplexReturnValue";
pub const SERVER_INVOKE_NO_PARAMETERS: &str = "ServerInvokeMethodNoParametersNoReturnValue";
pub const SERVER_INVOKE_SIMPLE_PARAMETERS: &str = "ServerInvokeMethodSimpleParametersNoReturnValue";
pub const STREAM_COUNTER: &str = "StreamCounterValuesToClient";

pub fn register(methods: &mut MethodRegistry) -> hubcore::Result<()> {
    methods.register_action(NO_PARAMETERS_NO_RETURN, vec![], |_ctx, _args| no_parameters_no_return())?;
    methods.register_function(NO_PARAMETERS_SIMPLE_RETURN, vec![], |_ctx, _args| no_parameters_simple_return())?;
    methods.register_action(ONE_PARAMETER_NO_RETURN, vec![Type::String], |_ctx, args| one_parameter_no_return(args))?;
    methods.register_function(ONE_PARAMETER_SIMPLE_RETURN, vec![Type::String], |_ctx, args| {
        one_parameter_simple_return(args)
    })?;
    methods.register_function(COMPLEX_PARAMETER_COMPLEX_RETURN, vec![PersonName::shape()], |_ctx, args| {
        complex_parameter_complex_return(args)
    })?;
    methods.register_action(SERVER_INVOKE_NO_PARAMETERS, vec![], |ctx, _args| server_invoke_no_parameters(ctx))?;
    methods.register_action(SERVER_INVOKE_SIMPLE_PARAMETERS, vec![], |ctx, _args| {
        server_invoke_simple_parameters(ctx)
    })?;
    methods.register_stream(STREAM_COUNTER, vec![Type::Int, Type::Int], stream_counter)?;
    Ok(())
}

async fn no_parameters_no_return() -> anyhow::Result<()> {
    tracing::info!(method = NO_PARAMETERS_NO_RETURN, "invoked");
    Ok(())
}

async fn no_parameters_simple_return() -> anyhow::Result<&'static str> {
    tracing::info!(method = NO_PARAMETERS_SIMPLE_RETURN, "invoked");
    Ok(NO_PARAMETERS_SIMPLE_RETURN)
}

async fn one_parameter_no_return(args: Args) -> anyhow::Result<()> {
    let p1: String = args.get(0)?;
    tracing::info!(method = ONE_PARAMETER_NO_RETURN, p1 = %p1, "invoked");
    Ok(())
}

async fn one_parameter_simple_return(args: Args) -> anyhow::Result<String> {
    let p1: String = args.get(0)?;
    tracing::info!(method = ONE_PARAMETER_SIMPLE_RETURN, p1 = %p1, "invoked");
    Ok(p1)
}

async fn complex_parameter_complex_return(args: Args) -> anyhow::Result<Greeting> {
    let req: PersonName = args.get(0)?;
    tracing::info!(method = COMPLEX_PARAMETER_COMPLEX_RETURN, req = %req, "invoked");
    Ok(req.greet())
}

async fn server_invoke_no_parameters(ctx: HubContext) -> anyhow::Result<()> {
    tracing::info!(method = SERVER_INVOKE_NO_PARAMETERS, connection = %ctx.caller(), "invoked");
    // Clients expect a single null argument here, not an empty list.
    invoke_caller(&ctx, SERVER_INVOKE_NO_PARAMETERS, vec![Value::Null]).await;
    Ok(())
}

async fn server_invoke_simple_parameters(ctx: HubContext) -> anyhow::Result<()> {
    tracing::info!(method = SERVER_INVOKE_SIMPLE_PARAMETERS, connection = %ctx.caller(), "invoked");
    let args = vec![Value::String("p1".into()), Value::Int(1)];
    invoke_caller(&ctx, SERVER_INVOKE_SIMPLE_PARAMETERS, args).await;
    Ok(())
}

/// A caller that left mid-invocation is an expected race, not a method failure.
async fn invoke_caller(ctx: &HubContext, method: &str, args: Vec<Value>) {
    if let Err(e) = ctx.send_to_caller(method, args).await {
        tracing::debug!(connection = %ctx.caller(), method, error = %e, "caller gone before server invocation");
    }
}

/// Returns the reader at once; values are produced in the background.
fn stream_counter(ctx: HubContext, args: Args) -> anyhow::Result<StreamReader> {
    let count: i64 = args.get(0)?;
    let delay_ms: i64 = args.get(1)?;
    tracing::info!(method = STREAM_COUNTER, connection = %ctx.caller(), count, delay_ms, "invoked");

    let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
    Ok(stream::spawn_producer(Capacity::Unbounded, move |writer| count_up(writer, count, delay)))
}

async fn count_up(writer: StreamWriter, count: i64, delay: Duration) -> anyhow::Result<()> {
    for i in 0..count {
        tokio::select! {
            _ = writer.cancelled() => {
                tracing::debug!(sent = i, "counter stream cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }

        tracing::debug!(value = i, "sending counter value to client");
        if writer.write(i).await.is_err() {
            return Ok(());
        }
    }
    writer.complete();
    Ok(())
}

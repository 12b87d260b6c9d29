//! # Method Registry
//!
//! The source of truth for what a hub can be asked to do. Maps invocable names to
//! their parameter shapes and bodies.
//!
//! ## Philosophy
//!
//! - **Explicit Result Kind**: Whether a method returns nothing, one value, or a stream
//!   is declared by the body variant at registration, never inferred per call.
//! - **Startup-Only**: Registration happens before the hub is built. The `Hub` holds
//!   the registry behind an `Arc` and never mutates it.
//! - **Case-Insensitive Names**: `send` and `Send` name the same method.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::HubContext;
use crate::error::Error;
use crate::error::Result;
use crate::stream::StreamReader;
use crate::value::Args;
use crate::value::IntoValue;
use crate::value::Type;
use crate::value::Value;

/// The kind of result a method produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    None,
    Single,
    Stream,
}

pub type ActionFn = Arc<dyn Fn(HubContext, Args) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type FunctionFn = Arc<dyn Fn(HubContext, Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub type StreamFn = Arc<dyn Fn(HubContext, Args) -> anyhow::Result<StreamReader> + Send + Sync>;

/// A callable method body, tagged with its result kind.
#[derive(Clone)]
pub enum MethodBody {
    /// Runs to completion; nothing is returned.
    Action(ActionFn),
    /// Runs to completion and returns one value.
    Function(FunctionFn),
    /// Returns the read end of a stream right away. Must not wait on production.
    Stream(StreamFn),
}

impl MethodBody {
    pub fn action<F, Fut>(f: F) -> Self
    where
        F: Fn(HubContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Action(Arc::new(move |ctx, args| f(ctx, args).boxed()))
    }

    pub fn function<F, Fut, R>(f: F) -> Self
    where
        F: Fn(HubContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: IntoValue + Send + 'static,
    {
        Self::Function(Arc::new(move |ctx, args| {
            let fut = f(ctx, args);
            async move { fut.await.map(IntoValue::into_value) }.boxed()
        }))
    }

    pub fn stream<F>(f: F) -> Self
    where
        F: Fn(HubContext, Args) -> anyhow::Result<StreamReader> + Send + Sync + 'static,
    {
        Self::Stream(Arc::new(f))
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Action(_) => ResultKind::None,
            Self::Function(_) => ResultKind::Single,
            Self::Stream(_) => ResultKind::Stream,
        }
    }
}

/// A registered server method.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    params: Vec<Type>,
    body: MethodBody,
}

impl MethodDescriptor {
    /// The name as it was registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn kind(&self) -> ResultKind {
        self.body.kind()
    }

    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Checks arity and shapes, producing the `Args` the body will see.
    pub fn validate(&self, args: Vec<Value>) -> Result<Args> {
        if args.len() != self.params.len() {
            return Err(Error::ArgumentMismatch {
                method: self.name.clone(),
                details: format!("expected {} arguments, got {}", self.params.len(), args.len()),
            });
        }

        for (index, (ty, value)) in self.params.iter().zip(&args).enumerate() {
            ty.check(value).map_err(|e| Error::ArgumentMismatch {
                method: self.name.clone(),
                details: format!("argument {}: {}", index, e),
            })?;
        }

        Ok(Args::new(args))
    }
}

/// The set of methods a hub exposes.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodDescriptor>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method. Fails with `DuplicateMethod` if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, params: Vec<Type>, body: MethodBody) -> Result<()> {
        let name = name.into();
        let key = key(&name);
        if self.methods.contains_key(&key) {
            return Err(Error::DuplicateMethod(name));
        }

        tracing::debug!(method = %name, kind = ?body.kind(), arity = params.len(), "registered method");
        self.methods.insert(key, MethodDescriptor { name, params, body });
        Ok(())
    }

    pub fn register_action<F, Fut>(&mut self, name: impl Into<String>, params: Vec<Type>, f: F) -> Result<()>
    where
        F: Fn(HubContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, params, MethodBody::action(f))
    }

    pub fn register_function<F, Fut, R>(&mut self, name: impl Into<String>, params: Vec<Type>, f: F) -> Result<()>
    where
        F: Fn(HubContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: IntoValue + Send + 'static,
    {
        self.register(name, params, MethodBody::function(f))
    }

    pub fn register_stream<F>(&mut self, name: impl Into<String>, params: Vec<Type>, f: F) -> Result<()>
    where
        F: Fn(HubContext, Args) -> anyhow::Result<StreamReader> + Send + Sync + 'static,
    {
        self.register(name, params, MethodBody::stream(f))
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(&key(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.values().map(|m| m.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> MethodBody {
        MethodBody::action(|_ctx, _args| async { anyhow::Ok(()) })
    }

    #[test]
    fn test_register_and_lookup_is_case_insensitive() {
        let mut registry = MethodRegistry::new();
        registry.register("Send", vec![Type::String, Type::String], noop()).unwrap();

        let method = registry.get("send").expect("lookup should ignore case");
        assert_eq!(method.name(), "Send");
        assert_eq!(method.kind(), ResultKind::None);
        assert_eq!(method.params().len(), 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = MethodRegistry::new();
        registry.register("Echo", vec![], noop()).unwrap();

        let err = registry.register("ECHO", vec![], noop()).unwrap_err();
        assert_eq!(err, Error::DuplicateMethod("ECHO".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_arity() {
        let mut registry = MethodRegistry::new();
        registry.register("Echo", vec![Type::String], noop()).unwrap();

        let err = registry.get("Echo").unwrap().validate(vec![]).unwrap_err();
        match err {
            Error::ArgumentMismatch { method, details } => {
                assert_eq!(method, "Echo");
                assert!(details.contains("expected 1 arguments, got 0"));
            }
            other => panic!("Expected ArgumentMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_shapes() {
        let mut registry = MethodRegistry::new();
        registry.register("Count", vec![Type::Int, Type::Int], noop()).unwrap();
        let method = registry.get("Count").unwrap();

        assert!(method.validate(vec![Value::Int(5), Value::Int(0)]).is_ok());

        let err = method.validate(vec![Value::Int(5), Value::String("0".into())]).unwrap_err();
        assert!(err.to_string().contains("argument 1"));
    }

    #[test]
    fn test_result_kinds() {
        let function = MethodBody::function(|_ctx, _args| async { anyhow::Ok("x") });
        let stream = MethodBody::stream(|_ctx, _args| {
            let (_writer, reader) = crate::stream::channel(crate::stream::Capacity::Unbounded);
            Ok(reader)
        });

        assert_eq!(noop().kind(), ResultKind::None);
        assert_eq!(function.kind(), ResultKind::Single);
        assert_eq!(stream.kind(), ResultKind::Stream);
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = MethodRegistry::new();
        registry.register("b", vec![], noop()).unwrap();
        registry.register("a", vec![], noop()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}

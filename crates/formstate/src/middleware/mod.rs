//! Action middleware.
//!
//! Every action sent through [`Form::dispatch`] passes through the registered
//! middlewares in registration order before reaching the base handler. A
//! middleware may rewrite the action, act on it and stop, or call
//! [`Next::run`] to hand it on.

mod resolver;
mod undo;

pub use resolver::{Issue, ResolverMiddleware, SchemaResolver};
pub use undo::UndoRedo;

use crate::action::{Action, DispatchOutcome};
use crate::form::{FieldMeta, Form, FormHooks};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// An interceptor around the base action dispatcher.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Identifier used by [`Form::remove_middleware`] and in logs.
    fn id(&self) -> &str;

    async fn handle(&self, ctx: &MiddlewareContext, action: Action, next: Next<'_>) -> DispatchOutcome;
}

/// What a middleware can reach on the form.
#[derive(Clone)]
pub struct MiddlewareContext {
    form: Form,
}

impl MiddlewareContext {
    pub(crate) fn new(form: Form) -> Self {
        Self { form }
    }

    /// Send a new action through the whole pipeline.
    pub fn dispatch(&self, action: Action) -> BoxFuture<'static, DispatchOutcome> {
        self.form.dispatch(action)
    }

    pub fn get_state(&self) -> Arc<Value> {
        self.form.values()
    }

    /// Meta of every registered field, in registration order.
    pub fn get_fields(&self) -> Vec<FieldMeta> {
        self.form.get_fields(&[])
    }

    pub fn hooks(&self) -> FormHooks {
        self.form.hooks()
    }

    pub fn form(&self) -> &Form {
        &self.form
    }
}

/// The rest of the pipeline after the current middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    ctx: &'a MiddlewareContext,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], ctx: &'a MiddlewareContext) -> Self {
        Self { chain, ctx }
    }

    pub async fn run(self, action: Action) -> DispatchOutcome {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.handle(self.ctx, action, Next::new(rest, self.ctx))
                    .await
            }
            None => self.ctx.form.apply(action).await,
        }
    }
}

/// Registered middlewares, cloned cheaply per dispatch.
#[derive(Clone, Default)]
pub(crate) struct Pipeline {
    chain: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Pipeline {
    pub(crate) fn push(&mut self, middleware: Arc<dyn Middleware>) {
        Arc::make_mut(&mut self.chain).push(middleware);
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.chain.len();
        Arc::make_mut(&mut self.chain).retain(|m| m.id() != id);
        self.chain.len() != before
    }

    pub(crate) fn chain(&self) -> &[Arc<dyn Middleware>] {
        &self.chain
    }

    pub(crate) fn len(&self) -> usize {
        self.chain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Middleware for Named {
        fn id(&self) -> &str {
            self.0
        }

        async fn handle(&self, _ctx: &MiddlewareContext, action: Action, next: Next<'_>) -> DispatchOutcome {
            next.run(action).await
        }
    }

    #[test]
    fn test_pipeline_push_and_remove() {
        let mut pipeline = Pipeline::default();
        pipeline.push(Arc::new(Named("a")));
        pipeline.push(Arc::new(Named("b")));
        let snapshot = pipeline.clone();

        assert!(pipeline.remove("a"));
        assert!(!pipeline.remove("a"));
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.chain()[0].id(), "b");
        assert_eq!(snapshot.len(), 2);
    }
}

//! Before and after hooks.
//!
//! A hook is a matcher plus an async handler. Matchers are plain predicates
//! over the request context; non-matching hooks are skipped without effect.

use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use pylon_core::{BoxFuture, CallResult, EndpointOutput};

use crate::context::{ContextPatch, RequestContext};

/// Decides whether a hook runs for a call.
pub type Matcher = dyn Fn(&RequestContext) -> bool + Send + Sync;

/// The type-erased hook handler, producing `R`.
pub type HookHandler<R> =
    dyn for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<R>> + Send + Sync;

/// What a before-hook asks the pipeline to do next.
#[derive(Debug)]
pub enum BeforeHook {
    /// Nothing to do; run the next hook.
    Continue,
    /// Merge into the live context, then run the next hook.
    Context(ContextPatch),
    /// Stop here: skip remaining hooks and the handler, return this output.
    Respond(EndpointOutput),
}

/// What an after-hook asks the pipeline to do with the result.
#[derive(Debug)]
pub enum AfterHook {
    /// Leave the result unchanged.
    Continue,
    /// Replace the response-header collection; the result is unchanged.
    ResponseHeader(HeaderMap),
    /// Replace the result (also recovers a failed call).
    Replace(EndpointOutput),
}

/// A matcher and handler pair.
pub struct Hook<R> {
    matcher: Arc<Matcher>,
    handler: Arc<HookHandler<R>>,
}

impl<R> Hook<R> {
    /// Creates a hook.
    pub fn new<M, F>(matcher: M, handler: F) -> Self
    where
        M: Fn(&RequestContext) -> bool + Send + Sync + 'static,
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<R>> + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
            handler: Arc::new(handler),
        }
    }

    /// Creates a hook that runs for every call.
    pub fn always<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<R>> + Send + Sync + 'static,
    {
        Self::new(|_| true, handler)
    }

    /// Creates a hook that runs only for calls to the given route path.
    pub fn for_path<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<R>> + Send + Sync + 'static,
    {
        let path = path.into();
        Self::new(move |ctx| ctx.path() == path, handler)
    }

    pub(crate) fn matches(&self, ctx: &RequestContext) -> bool {
        (self.matcher)(ctx)
    }

    pub(crate) fn run<'a>(&self, ctx: &'a mut RequestContext) -> BoxFuture<'a, CallResult<R>> {
        (self.handler)(ctx)
    }
}

impl<R> Clone for Hook<R> {
    fn clone(&self) -> Self {
        Self {
            matcher: Arc::clone(&self.matcher),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<R> fmt::Debug for Hook<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").finish_non_exhaustive()
    }
}

/// Ordered before and after hooks.
#[derive(Debug, Clone, Default)]
pub struct HookSet {
    /// Run in order before the handler.
    pub before: Vec<Hook<BeforeHook>>,
    /// Run in order after the handler.
    pub after: Vec<Hook<AfterHook>>,
}

impl HookSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a before-hook.
    #[must_use]
    pub fn before(mut self, hook: Hook<BeforeHook>) -> Self {
        self.before.push(hook);
        self
    }

    /// Adds an after-hook.
    #[must_use]
    pub fn after(mut self, hook: Hook<AfterHook>) -> Self {
        self.after.push(hook);
        self
    }

    /// True when there are no hooks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

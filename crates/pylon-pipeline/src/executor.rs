//! The hook chain state machine.
//!
//! ```text
//! RUNNING_BEFORE ──► INVOKING_HANDLER ──► RUNNING_AFTER ──► DONE
//!       │                  │                    ▲
//!       │ Respond          │ ApiError           │ recovery
//!       ▼                  └────────────────────┘
//!     DONE
//! ```
//!
//! Every step is awaited before the next one starts. Unclassified errors
//! abort the chain wherever they happen; typed errors raised by the handler
//! or an after-hook become the pending result, which later after-hooks may
//! replace.

use pylon_core::{CallError, CallResult, Reply};

use crate::context::{RequestContext, Returned};
use crate::endpoint::Endpoint;
use crate::hook::{AfterHook, BeforeHook, HookSet};

/// Runs before-hooks, the handler and after-hooks for one call.
pub(crate) async fn execute(
    endpoint: &Endpoint,
    hooks: &HookSet,
    mut ctx: RequestContext,
) -> CallResult<Reply> {
    for hook in &hooks.before {
        if !hook.matches(&ctx) {
            continue;
        }
        match hook.run(&mut ctx).await? {
            BeforeHook::Continue => {}
            BeforeHook::Context(patch) => ctx.apply(patch),
            BeforeHook::Respond(output) => {
                tracing::debug!(endpoint = %ctx.endpoint(), "before-hook answered the call");
                return Ok(Reply::new(output, ctx.take_response_headers()));
            }
        }
    }

    match endpoint.invoke(&mut ctx).await {
        Ok(output) => ctx.set_returned(output.into()),
        Err(CallError::Api(mut error)) => {
            if hooks.after.is_empty() {
                error.set_headers(ctx.take_response_headers());
                return Err(error.into());
            }
            ctx.set_returned(Returned::Recovered(error));
        }
        Err(error) => return Err(error),
    }

    for hook in &hooks.after {
        if !hook.matches(&ctx) {
            continue;
        }
        match hook.run(&mut ctx).await {
            Ok(AfterHook::Continue) => {}
            Ok(AfterHook::ResponseHeader(headers)) => ctx.replace_response_headers(headers),
            Ok(AfterHook::Replace(output)) => ctx.set_returned(output.into()),
            Err(CallError::Api(error)) => ctx.set_returned(Returned::Recovered(error)),
            Err(error) => return Err(error),
        }
    }

    let headers = ctx.take_response_headers();
    match ctx.take_returned() {
        Some(Returned::Success(value)) => Ok(Reply::new(value.into(), headers)),
        Some(Returned::Replaced(response)) => Ok(Reply::new(response.into(), headers)),
        Some(Returned::Recovered(mut error)) => {
            error.set_headers(headers);
            Err(error.into())
        }
        None => Err(anyhow::anyhow!("endpoint `{}` finished without a result", ctx.endpoint()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallContext, ContextPatch};
    use crate::global::test_context;
    use crate::hook::Hook;
    use http::HeaderValue;
    use pylon_core::{ApiError, ApiStatus};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        RequestContext::new(Arc::new(test_context()), "test", "/test", &CallContext::new())
    }

    fn echo_field() -> Endpoint {
        Endpoint::get("/test", |ctx| {
            Box::pin(async move { Ok(json!({ "role": ctx.field("role").cloned() }).into()) })
        })
    }

    fn failing(status: ApiStatus) -> Endpoint {
        Endpoint::get("/test", move |ctx| {
            Box::pin(async move {
                ctx.set_header("x-before-fail", HeaderValue::from_static("1"));
                Err(ApiError::new(status, "boom").into())
            })
        })
    }

    #[tokio::test]
    async fn test_context_patch_reaches_handler() {
        let hooks = HookSet::new().before(Hook::always(|_ctx| {
            Box::pin(async { Ok(BeforeHook::Context(ContextPatch::new().field("role", "admin"))) })
        }));

        let reply = execute(&echo_field(), &hooks, ctx()).await.unwrap();
        assert_eq!(reply.json(), Some(&json!({"role": "admin"})));
    }

    #[tokio::test]
    async fn test_before_hook_error_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let endpoint = Endpoint::get("/test", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(json!(null).into()) })
        });
        let hooks = HookSet::new().before(Hook::always(|_ctx| {
            Box::pin(async { Err(ApiError::unauthorized("no session").into()) })
        }));

        let err = execute(&endpoint, &hooks, ctx()).await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status(), ApiStatus::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fast_path_attaches_headers() {
        let err = execute(&failing(ApiStatus::BadRequest), &HookSet::new(), ctx())
            .await
            .unwrap_err();
        let err = err.as_api().unwrap();
        assert_eq!(err.status(), ApiStatus::BadRequest);
        assert_eq!(err.headers().get("x-before-fail").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_after_hook_error_becomes_pending_result() {
        let hooks = HookSet::new()
            .after(Hook::always(|_ctx| {
                Box::pin(async { Err(ApiError::forbidden("denied").into()) })
            }))
            .after(Hook::always(|ctx| {
                Box::pin(async move {
                    let status = ctx.returned().and_then(Returned::as_error).map(ApiError::status);
                    assert_eq!(status, Some(ApiStatus::Forbidden));
                    Ok(AfterHook::Continue)
                })
            }));

        let err = execute(&echo_field(), &hooks, ctx()).await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status(), ApiStatus::Forbidden);
    }

    #[tokio::test]
    async fn test_unhandled_after_hook_error_aborts() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let hooks = HookSet::new()
            .after(Hook::always(|_ctx| {
                Box::pin(async { Err(anyhow::anyhow!("storage offline").into()) })
            }))
            .after(Hook::always(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(AfterHook::Continue) })
            }));

        let err = execute(&echo_field(), &hooks, ctx()).await.unwrap_err();
        assert!(err.as_api().is_none());
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unhandled_handler_error_skips_after_hooks() {
        let endpoint = Endpoint::get("/test", |_ctx| {
            Box::pin(async { Err(anyhow::anyhow!("panic-free failure").into()) })
        });
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let hooks = HookSet::new().after(Hook::always(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(AfterHook::Continue) })
        }));

        let err = execute(&endpoint, &hooks, ctx()).await.unwrap_err();
        assert!(matches!(err, CallError::Unhandled(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovery_keeps_headers_on_reraised_error() {
        let hooks = HookSet::new().after(Hook::always(|_ctx| Box::pin(async { Ok(AfterHook::Continue) })));

        let err = execute(&failing(ApiStatus::Conflict), &hooks, ctx())
            .await
            .unwrap_err();
        let err = err.as_api().unwrap();
        assert_eq!(err.status(), ApiStatus::Conflict);
        assert_eq!(err.headers().get("x-before-fail").unwrap(), "1");
    }
}

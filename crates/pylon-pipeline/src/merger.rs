//! Folding plugin contributions into one table.
//!
//! Order is deterministic:
//!
//! 1. base endpoints, then each plugin's endpoints in plugin order, then the
//!    built-in `ok` endpoint. A name registered twice keeps the later
//!    endpoint, unless strict mode turns the collision into an error.
//! 2. middlewares flattened in plugin order, each bound to the global
//!    context.
//! 3. before and after hooks concatenated in plugin order, with the global
//!    hook of each phase (if any) appended last.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::endpoint::Endpoint;
use crate::error::PipelineError;
use crate::global::GlobalContext;
use crate::hook::{AfterHook, BeforeHook, Hook, HookSet};
use crate::middleware::Middleware;
use crate::plugin::Plugin;
use crate::routes;

/// Everything the plugins contributed, merged.
#[derive(Debug, Default)]
pub struct Contributions {
    /// Endpoint table keyed by name.
    pub endpoints: IndexMap<String, Endpoint>,
    /// Flattened middlewares.
    pub middlewares: Vec<Middleware>,
    /// Ordered hooks.
    pub hooks: HookSet,
}

/// Options-level hooks that run after every plugin's hooks.
#[derive(Debug, Clone, Default)]
pub struct GlobalHooks {
    /// Runs after every plugin before-hook.
    pub before: Option<Hook<BeforeHook>>,
    /// Runs after every plugin after-hook.
    pub after: Option<Hook<AfterHook>>,
}

/// Merges the base endpoints and plugin contributions.
///
/// # Errors
///
/// Returns `PipelineError::DuplicateEndpoint` when `strict` is set and a name
/// is registered twice.
pub fn merge_contributions(
    base: IndexMap<String, Endpoint>,
    plugins: &[Arc<dyn Plugin>],
    global_hooks: GlobalHooks,
    global: &Arc<GlobalContext>,
    strict: bool,
) -> Result<Contributions, PipelineError> {
    let mut merged = Contributions::default();

    for (name, endpoint) in base {
        register(&mut merged.endpoints, name, endpoint, "base", strict)?;
    }

    for plugin in plugins {
        for (name, endpoint) in plugin.endpoints() {
            register(&mut merged.endpoints, name, endpoint, plugin.id(), strict)?;
        }

        merged.middlewares.extend(
            plugin
                .middlewares()
                .into_iter()
                .map(|declared| Middleware::bind(plugin.id(), declared, Arc::clone(global))),
        );

        let hooks = plugin.hooks();
        merged.hooks.before.extend(hooks.before);
        merged.hooks.after.extend(hooks.after);
    }

    register(
        &mut merged.endpoints,
        routes::OK_ENDPOINT.to_string(),
        routes::ok(),
        "builtin",
        strict,
    )?;

    if let Some(before) = global_hooks.before {
        merged.hooks.before.push(before);
    }
    if let Some(after) = global_hooks.after {
        merged.hooks.after.push(after);
    }

    tracing::debug!(
        endpoints = merged.endpoints.len(),
        middlewares = merged.middlewares.len(),
        before_hooks = merged.hooks.before.len(),
        after_hooks = merged.hooks.after.len(),
        "merged plugin contributions"
    );

    Ok(merged)
}

fn register(
    table: &mut IndexMap<String, Endpoint>,
    name: String,
    endpoint: Endpoint,
    source: &str,
    strict: bool,
) -> Result<(), PipelineError> {
    if table.contains_key(&name) {
        if strict {
            return Err(PipelineError::duplicate_endpoint(name));
        }
        tracing::debug!(
            endpoint = %name,
            plugin = %source,
            "endpoint name already registered, later registration wins"
        );
    }
    table.insert(name, endpoint);
    Ok(())
}

//! Action registry: normalized action name → handler.
//!
//! Each batch row names an action. Instead of a growing chain of string comparisons,
//! actions are registered once under a normalized name (trimmed, lower-cased) and looked
//! up per row. `"Step_Scan"`, `"step_scan"` and `" STEP_SCAN "` all reach the same handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::metadata::ExecutionMetadata;
use crate::table::RowParameters;

/// Normalize an action name for registry lookup
pub fn normalize_action(name: &str) -> String {
    name.trim().to_lowercase()
}

/// What a handler reports back after running a row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionReport {
    /// Short human-readable summary
    pub summary: String,
    /// Run identifier, when the action produced a run
    pub run_uid: Option<String>,
    /// Number of events the action recorded
    pub num_events: u32,
}

impl ActionReport {
    /// Report with only a summary
    pub fn message(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Attach a run identifier
    pub fn with_run(mut self, run_uid: impl Into<String>, num_events: u32) -> Self {
        self.run_uid = Some(run_uid.into());
        self.num_events = num_events;
        self
    }
}

/// Capability invoked for rows naming a registered action
///
/// Handlers own all side effects (motion, acquisition, file writes). Errors are returned
/// to the dispatcher's caller untouched.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action for one row
    async fn execute(
        &self,
        params: &RowParameters,
        metadata: &ExecutionMetadata,
    ) -> anyhow::Result<ActionReport>;

    /// One-line description for listings
    fn description(&self) -> String {
        String::new()
    }
}

/// Adapter turning a synchronous closure into an [`ActionHandler`]
pub struct FnHandler<F> {
    description: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&RowParameters, &ExecutionMetadata) -> anyhow::Result<ActionReport> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(description: &str, func: F) -> Self {
        Self {
            description: description.to_string(),
            func,
        }
    }
}

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&RowParameters, &ExecutionMetadata) -> anyhow::Result<ActionReport> + Send + Sync,
{
    async fn execute(
        &self,
        params: &RowParameters,
        metadata: &ExecutionMetadata,
    ) -> anyhow::Result<ActionReport> {
        (self.func)(params, metadata)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Registry of recognized actions
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.action_names())
            .finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; replaces any handler already under that name
    pub fn register<H>(&mut self, action: &str, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.register_arc(action, Arc::new(handler));
    }

    /// Register a shared handler
    pub fn register_arc(&mut self, action: &str, handler: Arc<dyn ActionHandler>) {
        let key = normalize_action(action);
        debug!(action = %key, "Registering action");
        self.handlers.insert(key, handler);
    }

    /// Register a synchronous closure
    pub fn register_fn<F>(&mut self, action: &str, description: &str, func: F)
    where
        F: Fn(&RowParameters, &ExecutionMetadata) -> anyhow::Result<ActionReport>
            + Send
            + Sync
            + 'static,
    {
        self.register(action, FnHandler::new(description, func));
    }

    /// Make `alias` dispatch to the handler registered under `target`
    ///
    /// Returns false if `target` is not registered.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        match self.get(target) {
            Some(handler) => {
                self.register_arc(alias, handler);
                true
            }
            None => false,
        }
    }

    /// Look up the handler for a raw action name
    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&normalize_action(action)).cloned()
    }

    /// Check if an action is registered
    pub fn has_action(&self, action: &str) -> bool {
        self.handlers.contains_key(&normalize_action(action))
    }

    /// Registered names, sorted
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// List registered actions with descriptions, sorted by name
    pub fn list_actions(&self) -> Vec<(String, String)> {
        self.action_names()
            .into_iter()
            .map(|name| {
                let description = self
                    .handlers
                    .get(&name)
                    .map(|h| h.description())
                    .unwrap_or_default();
                (name, description)
            })
            .collect()
    }

    /// Number of registered names (aliases included)
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBuilder;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("Step_Scan", "step scan", |_, _| Ok(ActionReport::message("step")));

        assert!(registry.has_action("step_scan"));
        assert!(registry.has_action("STEP_SCAN"));
        assert!(registry.has_action("  step_scan "));
        assert!(!registry.has_action("step scan"));
        assert_eq!(registry.action_names(), vec!["step_scan"]);
    }

    #[test]
    fn test_alias_shares_handler() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("mv", "move", |_, _| Ok(ActionReport::message("moved")));
        assert!(registry.alias("Move", "mv"));
        assert!(!registry.alias("go", "missing"));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.list_actions(),
            vec![
                ("move".to_string(), "move".to_string()),
                ("mv".to_string(), "move".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_fn_handler_executes() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("open", "open shutter", |_, _| {
            Ok(ActionReport::message("opened"))
        });

        let handler = registry.get("OPEN").unwrap();
        let md = MetadataBuilder::new().action("open").build();
        let report = handler
            .execute(&RowParameters::default(), &md)
            .await
            .unwrap();
        assert_eq!(report.summary, "opened");
        assert_eq!(report.run_uid, None);
    }
}

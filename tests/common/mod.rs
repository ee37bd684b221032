//! Shared action runners for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use dagrun::runner::{ActionContext, ActionFailure, ActionRunner};
use dagrun::workflow::Action;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Succeeds every action, echoing its id and resolved params so tests can
/// assert on what the resolver produced.
pub struct EchoRunner;

#[async_trait]
impl ActionRunner for EchoRunner {
    async fn execute(&self, action: &Action, ctx: ActionContext) -> Result<Value, ActionFailure> {
        Ok(json!({
            "action": action.id.as_str(),
            "params": ctx.params,
        }))
    }
}

/// Scripted per-action outcome.
#[derive(Clone, Debug)]
pub enum Outcome {
    Succeed(Value),
    FailComponent(String),
    FailInfrastructure(String),
}

/// Runs each action according to a script keyed by ref; unknown refs echo.
/// Also records every dispatch context for later inspection.
pub struct ScriptedRunner {
    script: BTreeMap<String, Outcome>,
    pub contexts: Mutex<Vec<(String, ActionContext)>>,
    /// Per-action dispatch delays, so tests can pin completion order and
    /// observe in-flight work during cancellation.
    delays: BTreeMap<String, Duration>,
}

impl ScriptedRunner {
    pub fn new(script: impl IntoIterator<Item = (&'static str, Outcome)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            contexts: Mutex::new(Vec::new()),
            delays: BTreeMap::new(),
        }
    }

    pub fn with_delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn context_for(&self, id: &str) -> Option<ActionContext> {
        self.contexts
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == id)
            .map(|(_, ctx)| ctx.clone())
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn execute(&self, action: &Action, ctx: ActionContext) -> Result<Value, ActionFailure> {
        self.contexts
            .lock()
            .unwrap()
            .push((action.id.as_str().to_string(), ctx.clone()));
        if let Some(delay) = self.delays.get(action.id.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        match self.script.get(action.id.as_str()) {
            Some(Outcome::Succeed(value)) => Ok(value.clone()),
            Some(Outcome::FailComponent(msg)) => Err(ActionFailure::component(msg.clone())),
            Some(Outcome::FailInfrastructure(msg)) => {
                Err(ActionFailure::infrastructure(msg.clone()))
            }
            None => Ok(json!({ "action": action.id.as_str(), "params": ctx.params })),
        }
    }
}

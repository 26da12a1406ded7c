//! Shared test fixtures (used by unit, functional, and integration tests).
//!
//! [`ScriptedRunner`] stands in for `oc`/`kubectl`: each rule matches a
//! command by argument fragments and replies from a queue, so fixtures can
//! be driven through their full create/wait/delete flow without a cluster.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use storage_e2e::cli::{Cli, CommandOutput, CommandRunner};
use storage_e2e::cloud::CloudProvider;
use storage_e2e::config::default_fixtures_dir;
use storage_e2e::wait::PollConfig;
use storage_e2e::{Result, StorageContext};

/// Namespace scripted contexts run in
pub const TEST_NAMESPACE: &str = "e2e-storage";

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Call {
    /// Whether any argument contains `fragment`
    pub fn has(&self, fragment: &str) -> bool {
        self.args.iter().any(|a| a.contains(fragment))
    }

    /// Submitted stdin parsed as JSON
    pub fn stdin_json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdin.as_deref().unwrap_or("null")).unwrap()
    }
}

struct Rule {
    fragments: Vec<String>,
    responses: VecDeque<CommandOutput>,
}

impl Rule {
    /// Every fragment must equal some argument; a `~` prefix matches a
    /// substring instead
    fn matches(&self, args: &[String]) -> bool {
        self.fragments.iter().all(|f| match f.strip_prefix('~') {
            Some(part) => args.iter().any(|a| a.contains(part)),
            None => args.iter().any(|a| a == f),
        })
    }

    /// Pop queued replies; the last one repeats forever
    fn next(&mut self) -> CommandOutput {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_default()
        } else {
            self.responses.front().cloned().unwrap_or_default()
        }
    }
}

/// Scripted cluster CLI.
///
/// Rules are matched in registration order; a command no rule matches
/// fails with a NotFound-style stderr so unscripted lookups behave like a
/// missing object.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply to commands containing every fragment, in order
    pub fn on(&self, fragments: &[&str], responses: Vec<CommandOutput>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            fragments: fragments.iter().map(|f| (*f).to_string()).collect(),
            responses: responses.into(),
        });
        self
    }

    /// Reply with `stdout` every time
    pub fn ok(&self, fragments: &[&str], stdout: &str) -> &Self {
        self.on(fragments, vec![CommandOutput::success(stdout)])
    }

    /// Fail with `stderr` every time
    pub fn fail(&self, fragments: &[&str], stderr: &str) -> &Self {
        self.on(fragments, vec![CommandOutput::failure(1, stderr)])
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose arguments contain `fragment`
    pub fn calls_with(&self, fragment: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.has(fragment)).collect()
    }

    /// stdin of the most recent `apply`
    pub fn last_applied(&self) -> serde_json::Value {
        self.calls_with("apply")
            .last()
            .map(Call::stdin_json)
            .unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String], stdin: Option<String>) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(Call {
            program: program.to_string(),
            args: args.to_vec(),
            stdin,
        });
        let mut rules = self.rules.lock().unwrap();
        Ok(match rules.iter_mut().find(|r| r.matches(args)) {
            Some(rule) => rule.next(),
            None => CommandOutput::failure(
                1,
                format!("Error from server (NotFound): no scripted reply for {args:?}"),
            ),
        })
    }
}

/// Render retries short enough for tests
pub const FAST_RENDER: PollConfig = PollConfig::new(Duration::from_millis(10), Duration::from_millis(50));

/// Context over a scripted runner using the crate's own fixture templates
pub fn scripted_context(runner: Arc<ScriptedRunner>, provider: CloudProvider) -> StorageContext {
    StorageContext::new(
        Cli::new(runner, "oc").with_namespace(TEST_NAMESPACE),
        provider,
        default_fixtures_dir(),
    )
    .with_render_retry(FAST_RENDER)
}

/// `{"kind":"List","items":[...]}` wrapping `items`
pub fn list_of(items: &[serde_json::Value]) -> String {
    serde_json::json!({"apiVersion": "v1", "kind": "List", "items": items}).to_string()
}

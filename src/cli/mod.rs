//! Cluster CLI wrapper.
//!
//! [`Cli`] wraps `oc` or `kubectl` with the scoping switches the fixtures
//! need: a per-user namespace, an admin kubeconfig, and a "without
//! namespace" mode for cluster-scoped objects and pre-namespaced manifests.
//! All cluster interaction goes through argument lists and captured stdout.

mod runner;

pub use runner::{CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT, ProcessRunner, command_line};

#[cfg(test)]
pub use runner::MockCommandRunner;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kube::config::Kubeconfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Namespace used when neither the CLI nor the kubeconfig names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// `kubectl patch --type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    Merge,
    Json,
    Strategic,
}

impl PatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchType::Merge => "merge",
            PatchType::Json => "json",
            PatchType::Strategic => "strategic",
        }
    }
}

/// `items` of a `kubectl get -o json` list response
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Scoped handle on the cluster CLI.
///
/// Cheap to clone; the scoping methods return modified copies so a fixture
/// can issue `cli.as_admin().without_namespace()` without affecting others.
#[derive(Clone)]
pub struct Cli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    kubeconfig: Option<PathBuf>,
    admin_kubeconfig: Option<PathBuf>,
    namespace: Option<String>,
    admin: bool,
    without_namespace: bool,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("binary", &self.binary)
            .field("kubeconfig", &self.kubeconfig)
            .field("admin_kubeconfig", &self.admin_kubeconfig)
            .field("namespace", &self.namespace)
            .field("admin", &self.admin)
            .field("without_namespace", &self.without_namespace)
            .finish()
    }
}

impl Cli {
    /// Create a CLI handle running `binary` through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            kubeconfig: None,
            admin_kubeconfig: None,
            namespace: None,
            admin: false,
            without_namespace: false,
        }
    }

    /// Kubeconfig used for the test user
    pub fn with_kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.kubeconfig = path;
        self
    }

    /// Kubeconfig used by [`Cli::as_admin`]; falls back to the user kubeconfig
    pub fn with_admin_kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.admin_kubeconfig = path;
        self
    }

    /// Copy scoped to `namespace`
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        let mut cli = self.clone();
        cli.namespace = Some(namespace.into());
        cli.without_namespace = false;
        cli
    }

    /// Copy running with cluster-admin credentials
    pub fn as_admin(&self) -> Self {
        let mut cli = self.clone();
        cli.admin = true;
        cli
    }

    /// Copy that never adds `--namespace`
    pub fn without_namespace(&self) -> Self {
        let mut cli = self.clone();
        cli.without_namespace = true;
        cli
    }

    /// Runner shared with other CLIs (cloud provider tooling)
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    fn active_kubeconfig(&self) -> Option<&PathBuf> {
        if self.admin {
            self.admin_kubeconfig.as_ref().or(self.kubeconfig.as_ref())
        } else {
            self.kubeconfig.as_ref()
        }
    }

    /// Resolve the namespace commands run in.
    ///
    /// Uses the scoped namespace, then the kubeconfig's current-context
    /// namespace, then `default`.
    pub fn current_namespace(&self) -> String {
        if let Some(ns) = &self.namespace {
            return ns.clone();
        }
        namespace_from_kubeconfig(self.active_kubeconfig().map(PathBuf::as_path))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    fn full_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(path) = self.active_kubeconfig() {
            full.push(format!("--kubeconfig={}", path.display()));
        }
        let explicit_namespace = args
            .iter()
            .any(|a| *a == "-n" || a.starts_with("--namespace") || *a == "-A");
        if !self.without_namespace
            && !explicit_namespace
            && let Some(ns) = &self.namespace
        {
            full.push(format!("--namespace={ns}"));
        }
        full.extend(args.iter().map(|a| (*a).to_string()));
        full
    }

    /// Run a command and return the raw output, whatever the exit code
    pub async fn output(&self, args: &[&str]) -> Result<CommandOutput> {
        let full = self.full_args(args);
        self.runner.run(&self.binary, &full, None).await
    }

    /// Run a command, returning trimmed stdout or `CommandFailed`
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        self.execute(args, None).await
    }

    /// Run a command feeding `input` on stdin
    pub async fn run_with_stdin(&self, args: &[&str], input: String) -> Result<String> {
        self.execute(args, Some(input)).await
    }

    async fn execute(&self, args: &[&str], stdin: Option<String>) -> Result<String> {
        let full = self.full_args(args);
        let command = command_line(&self.binary, &full);
        debug!(command = %command, admin = self.admin, "Running CLI command");

        let output = self.runner.run(&self.binary, &full, stdin).await?;
        if output.is_success() {
            Ok(output.stdout.trim_end().to_string())
        } else {
            Err(Error::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// `get <kind> <name> -o jsonpath=<path>`
    pub async fn get_jsonpath(&self, kind: &str, name: &str, jsonpath: &str) -> Result<String> {
        let output = format!("jsonpath={jsonpath}");
        self.run(&["get", kind, name, "-o", &output]).await
    }

    /// `get <kind> <name> -o json`, deserialized
    pub async fn get_json<T: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<T> {
        let raw = self.run(&["get", kind, name, "-o", "json"]).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// `get <kind> [-l selector] -o json`, deserialized item by item
    pub async fn list_json<T: DeserializeOwned>(
        &self,
        kind: &str,
        selector: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut args = vec!["get", kind];
        if let Some(selector) = selector {
            args.push("-l");
            args.push(selector);
        }
        args.extend(["-o", "json"]);
        let raw = self.run(&args).await?;
        let list: ObjectList<T> = serde_json::from_str(&raw)?;
        Ok(list.items)
    }

    /// `apply -f -` with the object on stdin
    pub async fn apply_json(&self, object: &Value) -> Result<String> {
        let manifest = serde_json::to_string(object)?;
        self.run_with_stdin(&["apply", "-f", "-"], manifest).await
    }

    /// `delete <kind> <name> --ignore-not-found [extra..]`
    pub async fn delete(&self, kind: &str, name: &str, extra: &[&str]) -> Result<()> {
        let mut args = vec!["delete", kind, name, "--ignore-not-found"];
        args.extend_from_slice(extra);
        self.run(&args).await.map(|_| ())
    }

    /// `patch <kind> <name> --type=<t> -p <json>`
    pub async fn patch(
        &self,
        kind: &str,
        name: &str,
        patch: &Value,
        patch_type: PatchType,
    ) -> Result<String> {
        let body = serde_json::to_string(patch)?;
        let type_flag = format!("--type={}", patch_type.as_str());
        self.run(&["patch", kind, name, &type_flag, "-p", &body])
            .await
    }

    /// Run a shell command inside a pod
    pub async fn exec(&self, pod: &str, command: &str) -> Result<String> {
        self.run(&["exec", pod, "--", "/bin/sh", "-c", command])
            .await
    }

    /// Run a shell command inside a specific container of a pod
    pub async fn exec_in_container(&self, pod: &str, container: &str, command: &str) -> Result<String> {
        self.run(&["exec", pod, "-c", container, "--", "/bin/sh", "-c", command])
            .await
    }

    pub async fn describe(&self, kind: &str, name: &str) -> Result<String> {
        self.run(&["describe", kind, name]).await
    }

    pub async fn logs(&self, pod: &str, extra: &[&str]) -> Result<String> {
        let mut args = vec!["logs", pod];
        args.extend_from_slice(extra);
        self.run(&args).await
    }

    pub async fn cordon(&self, node: &str) -> Result<()> {
        self.node_admin("cordon", node).await
    }

    pub async fn uncordon(&self, node: &str) -> Result<()> {
        self.node_admin("uncordon", node).await
    }

    // `oc` keeps node maintenance under `adm`
    async fn node_admin(&self, verb: &str, node: &str) -> Result<()> {
        let is_oc = Path::new(&self.binary)
            .file_name()
            .is_some_and(|name| name == "oc");
        if is_oc {
            self.run(&["adm", verb, node]).await.map(|_| ())
        } else {
            self.run(&[verb, node]).await.map(|_| ())
        }
    }

    pub async fn scale(&self, kind: &str, name: &str, replicas: u32) -> Result<()> {
        let target = format!("{kind}/{name}");
        let count = format!("--replicas={replicas}");
        self.run(&["scale", &target, &count]).await.map(|_| ())
    }

    pub async fn rollout_restart(&self, kind: &str, name: &str) -> Result<()> {
        let target = format!("{kind}/{name}");
        self.run(&["rollout", "restart", &target]).await.map(|_| ())
    }
}

/// Namespace of the current context in a kubeconfig.
///
/// Reads `path` when given, otherwise the default kubeconfig locations.
pub fn namespace_from_kubeconfig(path: Option<&Path>) -> Option<String> {
    let kubeconfig = match path {
        Some(p) => Kubeconfig::read_from(p),
        None => Kubeconfig::read(),
    }
    .map_err(|e| debug!(error = %e, "Failed to read kubeconfig"))
    .ok()?;

    let current = kubeconfig.current_context.as_deref()?;
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == current)
        .and_then(|c| c.context.as_ref())
        .and_then(|c| c.namespace.clone())
        .filter(|ns| !ns.is_empty())
}

//! Template rendering and parameter injection.
//!
//! Fixtures are described by OpenShift-style `Template` documents: a list
//! of `objects` with `${NAME}` placeholders and a list of declared
//! `parameters`. Rendering substitutes the caller's parameters, merges
//! [`ExtraParameters`] into the result, applies platform shims and yields a
//! `v1/List` ready for `apply -f -`.

pub mod json_path;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Number, Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use yaml_rust2::{Yaml, YamlLoader};

use crate::cli::Cli;
use crate::cloud::{CloudProvider, IBM_DEFAULT_PROFILE};
use crate::error::{Error, Result};
use crate::wait::PollConfig;

/// Path prefix extra parameters are merged under by default
pub const DEFAULT_EXTRA_PREFIX: &str = "items.0.spec";

/// Rendering retry window
pub const RENDER_RETRY: PollConfig =
    PollConfig::new(Duration::from_secs(3), Duration::from_secs(15));

static PLACEHOLDER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").ok());
static WHOLE_JSON_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\$\{\{([A-Za-z0-9_]+)\}\}$").ok());

/// A declared template parameter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A parsed `Template` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub objects: Vec<Value>,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

/// Caller-supplied parameter values, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams(Vec<(String, String)>);

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter; a later value for the same name replaces the earlier one
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Structured overrides merged into a rendered `List`.
///
/// Each entry sets every key of an object under a dotted path prefix, so
/// `spec(json!({"volumeName": "pv-1"}))` sets `items.0.spec.volumeName`.
/// Only the prefix is a path; the keys are inserted verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraParameters {
    entries: Vec<(String, Value)>,
    removals: Vec<String>,
}

impl ExtraParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `value` under `prefix`.
    ///
    /// Objects are merged key by key; any other value replaces the field at
    /// `prefix` itself.
    pub fn at(mut self, prefix: impl Into<String>, value: Value) -> Self {
        self.entries.push((prefix.into(), value));
        self
    }

    /// Merge `value` under `items.0.spec`
    pub fn spec(self, value: Value) -> Self {
        self.at(DEFAULT_EXTRA_PREFIX, value)
    }

    /// Delete the field at `path` after merging
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.removals.push(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.removals.is_empty()
    }

    /// Append `other`'s entries and removals after this set's
    pub fn merge(mut self, other: &ExtraParameters) -> Self {
        self.entries.extend(other.entries.iter().cloned());
        self.removals.extend(other.removals.iter().cloned());
        self
    }

    /// Apply every entry, then every removal, to `rendered`
    pub fn apply_to(&self, rendered: &mut Value) -> Result<()> {
        for (prefix, value) in &self.entries {
            match value {
                Value::Object(fields) => match json_path::entry_mut(rendered, prefix)? {
                    // Keys are literal field names: `csi.storage.k8s.io/fstype`
                    Value::Object(target) => {
                        for (key, field) in fields {
                            target.insert(key.clone(), field.clone());
                        }
                    }
                    _ => {
                        return Err(Error::Template(format!(
                            "{prefix:?} is not an object; cannot merge fields into it"
                        )));
                    }
                },
                other => json_path::set(rendered, prefix, other.clone())?,
            }
        }
        for path in &self.removals {
            json_path::remove(rendered, path)?;
        }
        Ok(())
    }
}

impl Template {
    /// Load a YAML or JSON template file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Template(format!("failed to read template {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
            .map_err(|e| Error::Template(format!("{}: {e}", path.display())))
    }

    /// Parse template text; JSON is accepted as a YAML subset
    pub fn parse(raw: &str) -> Result<Self> {
        let mut docs = YamlLoader::load_from_str(raw)
            .map_err(|e| Error::Template(e.to_string()))?
            .into_iter();
        let doc = match (docs.next(), docs.next()) {
            (Some(doc), None) => yaml_to_json(doc, "")?,
            (None, _) => return Err(Error::Template("template is empty".to_string())),
            (Some(_), Some(_)) => {
                return Err(Error::Template(
                    "expected a single Template document".to_string(),
                ));
            }
        };
        if doc.get("objects").and_then(Value::as_array).is_none() {
            return Err(Error::Template(
                "document has no `objects` list".to_string(),
            ));
        }
        Ok(serde_json::from_value(doc)?)
    }

    /// Substitute parameters and wrap the objects in a `v1/List`.
    ///
    /// Parameters the template does not declare are ignored; declared ones
    /// the caller omits fall back to their default, or the empty string.
    /// A `required` parameter with neither is an error.
    pub fn process(&self, params: &TemplateParams) -> Result<Value> {
        let values: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                let value = match (params.get(&p.name), &p.value) {
                    (Some(given), _) => given.to_string(),
                    (None, Some(default)) => default.clone(),
                    (None, None) if p.required => {
                        return Err(Error::Template(format!(
                            "template parameter {} is required",
                            p.name
                        )));
                    }
                    (None, None) => String::new(),
                };
                Ok((p.name.clone(), Value::String(value)))
            })
            .collect::<Result<_>>()?;

        for (name, _) in params.iter() {
            if !values.contains_key(name) {
                debug!(parameter = name, "Ignoring parameter the template does not declare");
            }
        }

        let items = self
            .objects
            .iter()
            .map(|object| substitute(object, &values))
            .collect::<Result<Vec<_>>>()?;
        Ok(json!({"apiVersion": "v1", "kind": "List", "items": items}))
    }
}

/// Convert a loaded YAML node to JSON; `at` is the dotted location used in
/// error messages
fn yaml_to_json(yaml: Yaml, at: &str) -> Result<Value> {
    let fail = |what: &str| {
        let at = if at.is_empty() { "document root" } else { at };
        Error::Template(format!("{at}: {what}"))
    };
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(raw) => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| fail(&format!("{raw:?} is not a finite number")))?,
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| yaml_to_json(item, &join_location(at, &i.to_string())))
                .collect::<Result<_>>()?,
        ),
        Yaml::Hash(map) => {
            let mut object = Map::with_capacity(map.len());
            for (key, value) in map {
                // Template keys may be placeholders or plain scalars
                let key = match key {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    _ => return Err(fail("mapping keys must be scalars")),
                };
                let value = yaml_to_json(value, &join_location(at, &key))?;
                object.insert(key, value);
            }
            Value::Object(object)
        }
        Yaml::Alias(_) => return Err(fail("unresolved YAML alias")),
        Yaml::BadValue => return Err(fail("unparseable value")),
    })
}

fn join_location(at: &str, segment: &str) -> String {
    if at.is_empty() {
        segment.to_string()
    } else {
        format!("{at}.{segment}")
    }
}

fn substitute(node: &Value, values: &Map<String, Value>) -> Result<Value> {
    Ok(match node {
        Value::String(s) => substitute_str(s, values)?,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|i| substitute(i, values))
                .collect::<Result<_>>()?,
        ),
        // Keys are substituted too: `${VOLUMETYPE}: [...]`
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((substitute_key(k, values)?, substitute(v, values)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

fn substitute_str(s: &str, values: &Map<String, Value>) -> Result<Value> {
    let (Some(placeholder), Some(whole_json)) = (PLACEHOLDER_RE.as_ref(), WHOLE_JSON_RE.as_ref())
    else {
        return Err(Error::Template("placeholder patterns failed to compile".to_string()));
    };

    if let Some(caps) = whole_json.captures(s)
        && let Some(Value::String(raw)) = caps.get(1).and_then(|m| values.get(m.as_str()))
    {
        // `${{NAME}}` yields a typed value; plain text falls back to a string
        return Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())));
    }

    let replaced = placeholder.replace_all(s, |caps: &Captures<'_>| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        match caps.get(1).and_then(|m| values.get(m.as_str())) {
            Some(Value::String(v)) => v.clone(),
            _ => whole.to_string(),
        }
    });
    Ok(Value::String(replaced.into_owned()))
}

fn substitute_key(key: &str, values: &Map<String, Value>) -> Result<String> {
    Ok(match substitute_str(key, values)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Inject the IBM IOPS profile into StorageClasses that lack one
pub fn apply_platform_shims(rendered: &mut Value, provider: &CloudProvider) {
    if !provider.requires_iops_profile() {
        return;
    }
    let Some(items) = rendered.get_mut("items").and_then(Value::as_array_mut) else {
        return;
    };
    for item in items {
        if item.get("kind").and_then(Value::as_str) != Some("StorageClass") {
            continue;
        }
        let Some(object) = item.as_object_mut() else {
            continue;
        };
        let parameters = object
            .entry("parameters")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(parameters) = parameters.as_object_mut()
            && !parameters.contains_key("profile")
        {
            debug!(profile = IBM_DEFAULT_PROFILE, "Injecting default StorageClass profile");
            parameters.insert(
                "profile".to_string(),
                Value::String(IBM_DEFAULT_PROFILE.to_string()),
            );
        }
    }
}

/// Renders templates for one cloud provider
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    provider: CloudProvider,
    retry: PollConfig,
}

impl TemplateRenderer {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            retry: RENDER_RETRY,
        }
    }

    /// Override the rendering retry window
    pub fn with_retry(mut self, retry: PollConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &CloudProvider {
        &self.provider
    }

    fn render_once(
        &self,
        path: &Path,
        params: &TemplateParams,
        extra: &ExtraParameters,
    ) -> Result<Value> {
        let mut rendered = Template::load(path)?.process(params)?;
        extra.apply_to(&mut rendered)?;
        apply_platform_shims(&mut rendered, &self.provider);
        Ok(rendered)
    }

    /// Render `path` into a `v1/List`.
    ///
    /// Failures are retried at a fixed interval until the retry window
    /// closes.
    pub async fn render(
        &self,
        path: &Path,
        params: &TemplateParams,
        extra: &ExtraParameters,
    ) -> Result<Value> {
        let deadline = Instant::now() + self.retry.timeout;
        loop {
            match self.render_once(path, params, extra) {
                Ok(rendered) => {
                    debug!(
                        template = %path.display(),
                        rendered = %rendered,
                        "Rendered template"
                    );
                    return Ok(rendered);
                }
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Template(format!(
                            "failed to render {} within {:?}: {e}",
                            path.display(),
                            self.retry.timeout
                        )));
                    }
                    warn!(template = %path.display(), error = %e, "Template rendering failed, retrying");
                    sleep(self.retry.interval.min(deadline - now)).await;
                }
            }
        }
    }

    /// Render and submit through `cli`; submission is not retried
    pub async fn render_and_apply(
        &self,
        cli: &Cli,
        path: &Path,
        params: &TemplateParams,
        extra: &ExtraParameters,
    ) -> Result<Value> {
        let rendered = self.render(path, params, extra).await?;
        let output = cli.apply_json(&rendered).await?;
        debug!(template = %path.display(), output = %output, "Applied rendered template");
        Ok(rendered)
    }
}

/// `<fixtures_dir>/<file>`
pub fn template_path(fixtures_dir: &Path, file: &str) -> PathBuf {
    fixtures_dir.join(file)
}

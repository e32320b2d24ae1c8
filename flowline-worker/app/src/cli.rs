//! Command-line argument tree.
//!
//! Positional arguments select the flow path; `--name value` flags build a
//! nested value tree where dotted names nest (`--in.report x` becomes
//! `{"in": {"report": "x"}}`). Flag values that read as a JSON number,
//! boolean or `null` are stored as such; a flag without a value is `true`.

use flowline_core::value::{deep_merge, get_path, set_path, INLINE_JSON_MARKER};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Common parameters understood by the runner itself.
pub const RESERVED: &[&str] = &[
    "id",
    "stdin",
    "stdout",
    "stderr",
    "logger",
    "metrics",
    "ctrl",
    "in",
    "out",
    "io",
    "profile",
    "c",
    "formatter",
    "parser",
    "help",
];

/// Flag holding structured flow parameters.
pub const STRUCTURED_KEY: &str = "c";

/// Errors that can occur while parsing arguments.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Empty flag name, or a name starting or ending with a dot.
    #[error("Invalid flag: {}", _0)]
    InvalidFlag(String),
}

/// Whether a top-level flag name is a common parameter.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Parsed command line of one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Invocation {
    /// Flow path segments, dotted positionals split.
    pub path: Vec<String>,
    /// Flag tree.
    pub flags: Map<String, Value>,
}

impl Invocation {
    /// Parses arguments, excluding the program name.
    ///
    /// A bare `--` ends flag parsing; everything after it is positional.
    pub fn parse<I, S>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut flags = Value::Object(Map::new());
        let mut path = Vec::new();
        let mut positional_only = false;

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            i += 1;

            let name = match arg.strip_prefix("--") {
                Some(_) if positional_only => None,
                Some("") => {
                    positional_only = true;
                    continue;
                }
                Some(name) => Some(name),
                None => None,
            };
            let Some(name) = name else {
                path.extend(
                    arg.split('.')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
                continue;
            };

            let (name, raw) = match name.split_once('=') {
                Some((name, raw)) => (name, Some(raw)),
                None => match args.get(i) {
                    Some(next) if !next.starts_with("--") => {
                        i += 1;
                        (name, Some(next.as_str()))
                    }
                    _ => (name, None),
                },
            };
            if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
                return Err(Error::InvalidFlag(arg.clone()));
            }
            // Inline JSON stays text until it is expanded.
            let value = match raw {
                Some(raw) if name.ends_with(INLINE_JSON_MARKER) => Value::String(raw.to_string()),
                Some(raw) => coerce(raw),
                None => Value::Bool(true),
            };
            set_path(&mut flags, name, value);
        }

        let flags = match flags {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self { path, flags })
    }

    /// Layers these flags over defaults, e.g. the CLI defaults of a
    /// resolved configuration.
    pub fn with_defaults(&self, defaults: &Map<String, Value>) -> Self {
        let mut merged = Value::Object(defaults.clone());
        deep_merge(&mut merged, &Value::Object(self.flags.clone()));
        let flags = match merged {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            path: self.path.clone(),
            flags,
        }
    }

    /// Flag value at a dotted path.
    pub fn flag(&self, path: &str) -> Option<&Value> {
        let (head, tail) = path.split_once('.').unwrap_or((path, ""));
        get_path(self.flags.get(head)?, tail)
    }

    /// Flag value rendered as text, see [`text`].
    pub fn text(&self, path: &str) -> Option<String> {
        self.flag(path).map(text)
    }

    /// Instance id, if one was assigned.
    pub fn id(&self) -> Option<String> {
        self.text("id").filter(|id| !id.is_empty())
    }

    pub fn profile(&self) -> Option<String> {
        self.text("profile").filter(|p| !p.is_empty())
    }

    pub fn parser(&self) -> Option<String> {
        self.text("parser").filter(|p| !p.is_empty())
    }

    pub fn formatter(&self) -> Option<String> {
        self.text("formatter").filter(|f| !f.is_empty())
    }

    pub fn help(&self) -> bool {
        matches!(self.flag("help"), Some(v) if v != &Value::Bool(false))
    }

    /// Descriptor bound to a standard channel; empty when unbound.
    pub fn descriptor(&self, name: &str) -> String {
        self.text(name).unwrap_or_default()
    }

    /// Named descriptors under `in`, `out` or `io`.
    pub fn channels(&self, kind: &str) -> BTreeMap<String, String> {
        match self.flags.get(kind) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, value)| (name.clone(), text(value)))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Structured parameters given with `--c.<path>`.
    pub fn structured(&self) -> Option<&Value> {
        self.flags.get(STRUCTURED_KEY)
    }

    /// Inline JSON given with `--c$`.
    pub fn structured_inline(&self) -> Option<&Value> {
        self.flags.get(&format!("{STRUCTURED_KEY}$"))
    }

    /// Top-level flag for a declared parameter name, unless the name is a
    /// common parameter.
    pub fn shortcut(&self, name: &str) -> Option<&Value> {
        if is_reserved(name) {
            return None;
        }
        self.flags.get(name)
    }
}

/// Reads a raw flag value as a JSON scalar when it is one.
pub fn coerce(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Renders a flag value as text. A bare flag (`true`) or `null` is empty.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) | Value::Null => String::new(),
        other => other.to_string(),
    }
}

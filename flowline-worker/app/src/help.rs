//! Usage listings and flow help text.

use flowline_core::registry::{FlowDefinition, PathRegistry};
use flowline_core::value::flatten;
use serde_json::Value;
use std::fmt::Write;

/// Program name shown in listings.
pub const PROGRAM: &str = "flowline";
/// Path that asks for the usage listing.
pub const HELP_COMMAND: &str = "help";

/// Column where descriptions start.
const DESCRIPTION_COLUMN: usize = 40;

/// Common parameters: flag, argument and description.
const COMMON_PARAMS: &[(&str, &str, &str)] = &[
    ("--id", "<value>", "Identifier of the flow instance"),
    ("--stdin", "<src>", "Reads primary input from a file, pipe or socket"),
    ("--stdout", "<dest>", "Writes primary output to a file, pipe or socket"),
    ("--stderr", "<dest>", "Default sink of logger and metrics records"),
    ("--logger", "<dest>", "Writes logger records to a file, pipe or socket"),
    ("--metrics", "<dest>", "Writes metrics records to a file, pipe or socket"),
    ("--ctrl", "<src>", "Reads control records from a file, pipe or socket"),
    ("--in.<name>", "<src>", "Binds a named auxiliary input"),
    ("--out.<name>", "<dest>", "Binds a named auxiliary output"),
    ("--io.<name>", "<dest>", "Binds a named duplex channel"),
    ("--profile", "<name>", "Starts from the named parameter profile"),
    ("--c.<my.param>", "<value>", "Sets a flow parameter, e.g. --c.color red"),
    ("--c[.<my.param>]$", "<json>", "Sets flow parameters from JSON text"),
    ("--formatter", "<name>", "Output record formatter"),
    ("--parser", "<name>", "Input record parser"),
    ("--help", "", "Shows flow parameters"),
];

fn line(out: &mut String, left: &str, right: &str) {
    let _ = if right.is_empty() {
        writeln!(out, "  {left}")
    } else if left.len() + 2 < DESCRIPTION_COLUMN {
        writeln!(out, "  {left:<width$}{right}", width = DESCRIPTION_COLUMN - 2)
    } else {
        writeln!(out, "  {left} {right}")
    };
}

fn header(out: &mut String) {
    let title = format!("{PROGRAM}: streaming ND-JSON processor");
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
}

/// Lists the flows registered below `prefix`.
///
/// `note` is printed above the listing, e.g. to name an unknown path.
pub fn usage(registry: &PathRegistry, prefix: &[String], note: Option<&str>) -> String {
    let mut out = String::new();
    header(&mut out);
    if let Some(note) = note {
        let _ = writeln!(out, "{note}");
    }

    let flows = registry.flows_under(prefix);
    if flows.is_empty() {
        let _ = writeln!(out, "No flows installed.");
        return out;
    }

    let _ = writeln!(out, "Installed flows:");
    for flow in flows {
        let command = format!("{PROGRAM} {}", flow.path.replace('.', " "));
        line(
            &mut out,
            &command,
            flow.metadata.title.as_deref().unwrap_or_default(),
        );
    }
    let _ = writeln!(out, "For flow specific help, use {PROGRAM} <flow> --help");
    out
}

/// Describes the parameters of a flow.
///
/// `defaults` is the resolved `$default` parameter tree.
pub fn flow_help(definition: &FlowDefinition, defaults: &Value) -> String {
    let mut out = String::new();
    header(&mut out);
    if let Some(title) = &definition.metadata.title {
        let _ = writeln!(out, "{title}");
    }

    let declared = flatten(&definition.metadata.params);
    let defaults = flatten(defaults);
    let _ = writeln!(
        out,
        "Flow parameters for [{PROGRAM} {}]:",
        definition.path.replace('.', " ")
    );
    if declared.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (name, description) in &declared {
        let description = match description {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let description = match defaults.get(name) {
            Some(default) => format!("{description} (default: {default})"),
            None => description,
        };
        line(&mut out, &format!("--[c.]{name} <value>"), &description);
    }

    let _ = writeln!(out, "Common parameters:");
    for (flag, argument, description) in COMMON_PARAMS {
        let left = if argument.is_empty() {
            flag.to_string()
        } else {
            format!("{flag} {argument}")
        };
        line(&mut out, &left, description);
    }
    out
}

//! Process-scoped runtime context.
//!
//! Holds the flow registry, the override rules and the codec registry. The
//! runtime is created once at startup, populated through the registration
//! methods, then passed by reference to every run. Registration needs
//! `&mut Runtime` and resolution only `&Runtime`, so a run always observes a
//! consistent snapshot of what was registered before it started.

use crate::codec::{CodecRegistry, Formatter, Parser};
use crate::flow::FlowFactory;
use crate::registry::{FlowDefinition, FlowMetadata, PathRegistry, Resolution};
use crate::resolve::{self, OverrideRules, ResolvedConfig};
use serde_json::Value;
use std::sync::Arc;

/// Registries shared by every flow invocation of the process.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    registry: PathRegistry,
    overrides: OverrideRules,
    codecs: CodecRegistry,
}

impl Runtime {
    /// Runtime with an empty flow registry and the built-in codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flow at a dotted path.
    pub fn register_flow(
        &mut self,
        path: &str,
        factory: Arc<dyn FlowFactory>,
        metadata: FlowMetadata,
    ) -> Arc<FlowDefinition> {
        self.registry.register(path, factory, metadata)
    }

    /// Appends an override rule.
    pub fn register_override(
        &mut self,
        flow_pattern: &str,
        profile_pattern: &str,
        config: Value,
    ) -> Result<(), resolve::Error> {
        self.overrides
            .register(flow_pattern, profile_pattern, config)
    }

    /// Registers a named parser.
    pub fn register_parser(&mut self, name: &str, parser: Arc<dyn Parser>) {
        self.codecs.register_parser(name, parser);
    }

    /// Registers a named formatter.
    pub fn register_formatter(&mut self, name: &str, formatter: Arc<dyn Formatter>) {
        self.codecs.register_formatter(name, formatter);
    }

    /// Resolves a path given as segments.
    pub fn resolve_path(&self, segments: &[String]) -> Resolution {
        self.registry.resolve(segments)
    }

    /// Computes the effective configuration of a flow for a profile.
    pub fn resolve_config(
        &self,
        flow_path: &str,
        profile: &str,
    ) -> Result<ResolvedConfig, resolve::Error> {
        resolve::resolve_config(&self.registry, &self.overrides, flow_path, profile)
    }

    /// Computes the effective configuration of a looked up flow.
    pub fn resolve_definition(&self, definition: &FlowDefinition, profile: &str) -> ResolvedConfig {
        resolve::resolve_definition(definition, &self.overrides, profile)
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    pub fn overrides(&self) -> &OverrideRules {
        &self.overrides
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NdJson;
    use crate::flow::{Error, Flow, FlowContext};
    use serde_json::json;

    fn factory() -> Arc<dyn FlowFactory> {
        Arc::new(|_: FlowContext| -> Result<Box<dyn Flow>, Error> {
            Err(Error::MissingRequiredAttribute("unused".to_string()))
        })
    }

    #[test]
    fn test_runtime_registration_and_resolution() {
        let mut runtime = Runtime::new();
        runtime.register_flow(
            "a.b",
            factory(),
            FlowMetadata::default().profile("$default", json!({"x": 0, "y": 0})),
        );
        runtime
            .register_override("a.*", "$default", json!({"params": {"x": 1}}))
            .unwrap();
        runtime
            .register_override("a.b", "$default", json!({"params": {"x": 2}}))
            .unwrap();

        let resolved = runtime.resolve_config("a.b", "$default").unwrap();
        assert_eq!(resolved.params, json!({"x": 2, "y": 0}));
        assert_eq!(runtime.overrides().len(), 2);
    }

    #[test]
    fn test_runtime_namespace_resolution() {
        let mut runtime = Runtime::new();
        runtime.register_flow("a.b", factory(), FlowMetadata::default());
        runtime.register_flow("a.c", factory(), FlowMetadata::default());

        match runtime.resolve_path(&["a".to_string()]) {
            Resolution::Namespace { children, .. } => {
                assert_eq!(children, vec!["b".to_string(), "c".to_string()])
            }
            other => panic!("Expected namespace, got {other:?}"),
        }
    }

    #[test]
    fn test_runtime_codec_registration() {
        let mut runtime = Runtime::new();
        assert!(runtime.codecs().parser("ndjson").is_ok());
        runtime.register_parser("lines", Arc::new(NdJson::default()));
        runtime.register_formatter("lines", Arc::new(NdJson::default()));
        assert!(runtime.codecs().parser("lines").is_ok());
        assert!(runtime.codecs().formatter("lines").is_ok());
    }
}

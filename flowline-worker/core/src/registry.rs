//! Dotted-path registry of flow definitions.
//!
//! Flows live at the leaves of a namespace tree addressed by dotted paths such
//! as `core.route`. Resolution walks the path segment by segment and stops at
//! the first leaf, so a flow also answers for longer paths below it; the
//! unmatched tail is handed to the flow as positional arguments.

use crate::flow::FlowFactory;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata attached to a flow at registration time.
#[derive(Debug, Clone, Default)]
pub struct FlowMetadata {
    /// Short human-readable description used in usage listings.
    pub title: Option<String>,
    /// Declared parameters as a tree of descriptions.
    pub params: Value,
    /// Named default parameter trees, keyed by profile name.
    pub profiles: BTreeMap<String, Value>,
}

impl FlowMetadata {
    /// Creates empty metadata with a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            params: Value::Object(Default::default()),
            profiles: BTreeMap::new(),
        }
    }

    /// Adds a declared parameter description at a dotted path.
    pub fn param(mut self, path: &str, description: impl Into<String>) -> Self {
        crate::value::set_path(&mut self.params, path, Value::String(description.into()));
        self
    }

    /// Adds a named profile with its default parameter tree.
    pub fn profile(mut self, name: impl Into<String>, defaults: Value) -> Self {
        self.profiles.insert(name.into(), defaults);
        self
    }

    /// Top-level names of the declared parameters.
    pub fn declared_names(&self) -> impl Iterator<Item = &String> {
        self.params.as_object().into_iter().flat_map(|m| m.keys())
    }
}

/// A registered flow: its factory and metadata.
#[derive(Clone)]
pub struct FlowDefinition {
    /// Dotted registration path.
    pub path: String,
    /// Creates running instances.
    pub factory: Arc<dyn FlowFactory>,
    /// Title, declared parameters and profiles.
    pub metadata: FlowMetadata,
}

impl fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A node of the registry tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// A registered flow.
    Leaf(Arc<FlowDefinition>),
    /// An intermediate namespace with named children.
    Namespace(BTreeMap<String, Node>),
}

impl Node {
    fn empty_namespace() -> Self {
        Node::Namespace(BTreeMap::new())
    }
}

/// Result of resolving a dotted path.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A flow was found at `matched`; `rest` holds the unconsumed segments.
    Flow {
        definition: Arc<FlowDefinition>,
        matched: Vec<String>,
        rest: Vec<String>,
    },
    /// The path names a namespace; `children` lists its direct entries.
    Namespace {
        path: Vec<String>,
        children: Vec<String>,
    },
    /// Nothing is registered at the path.
    NotFound { path: Vec<String> },
}

/// Splits a dotted path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Namespace tree mapping dotted paths to flow definitions.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    root: Node,
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self {
            root: Node::empty_namespace(),
        }
    }
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flow at a dotted path, replacing any existing entry there.
    ///
    /// Intermediate namespaces are created as needed. A leaf found on the way
    /// is replaced by a namespace, since it would otherwise shadow the new flow.
    pub fn register(
        &mut self,
        path: &str,
        factory: Arc<dyn FlowFactory>,
        metadata: FlowMetadata,
    ) -> Arc<FlowDefinition> {
        let segments = split_path(path);
        let definition = Arc::new(FlowDefinition {
            path: segments.join("."),
            factory,
            metadata,
        });

        let Some((last, parents)) = segments.split_last() else {
            warn!("Replacing registry root with flow {}", definition.path);
            self.root = Node::Leaf(Arc::clone(&definition));
            return definition;
        };

        let previous = insert(&mut self.root, parents, last, Arc::clone(&definition));
        match previous {
            Some(Node::Leaf(_)) => debug!("Flow {} replaced", definition.path),
            Some(Node::Namespace(_)) => warn!("Flow {} replaced a namespace", definition.path),
            None => debug!("Flow {} registered", definition.path),
        }
        definition
    }

    /// Resolves a path given as segments.
    pub fn resolve(&self, segments: &[String]) -> Resolution {
        let mut node = &self.root;
        for (i, segment) in segments.iter().enumerate() {
            match node {
                Node::Leaf(definition) => {
                    return Resolution::Flow {
                        definition: Arc::clone(definition),
                        matched: segments[..i].to_vec(),
                        rest: segments[i..].to_vec(),
                    };
                }
                Node::Namespace(children) => match children.get(segment) {
                    Some(child) => node = child,
                    None => {
                        return Resolution::NotFound {
                            path: segments.to_vec(),
                        }
                    }
                },
            }
        }

        match node {
            Node::Leaf(definition) => Resolution::Flow {
                definition: Arc::clone(definition),
                matched: segments.to_vec(),
                rest: Vec::new(),
            },
            Node::Namespace(children) => Resolution::Namespace {
                path: segments.to_vec(),
                children: children.keys().cloned().collect(),
            },
        }
    }

    /// Resolves a dotted path string.
    pub fn resolve_dotted(&self, path: &str) -> Resolution {
        self.resolve(&split_path(path))
    }

    /// Looks up the flow registered exactly at `path`.
    pub fn get(&self, path: &str) -> Option<Arc<FlowDefinition>> {
        match self.resolve_dotted(path) {
            Resolution::Flow {
                definition, rest, ..
            } if rest.is_empty() => Some(definition),
            _ => None,
        }
    }

    /// All registered flows below `prefix`, in path order.
    pub fn flows_under(&self, prefix: &[String]) -> Vec<Arc<FlowDefinition>> {
        fn collect(node: &Node, out: &mut Vec<Arc<FlowDefinition>>) {
            match node {
                Node::Leaf(definition) => out.push(Arc::clone(definition)),
                Node::Namespace(children) => {
                    for child in children.values() {
                        collect(child, out);
                    }
                }
            }
        }

        let mut node = &self.root;
        for segment in prefix {
            match node {
                Node::Namespace(children) => match children.get(segment) {
                    Some(child) => node = child,
                    None => return Vec::new(),
                },
                Node::Leaf(_) => break,
            }
        }
        let mut out = Vec::new();
        collect(node, &mut out);
        out
    }
}

/// Inserts a leaf at `parents.last`, turning leaves on the way into empty
/// namespaces. Returns the node previously stored there.
fn insert(
    node: &mut Node,
    parents: &[String],
    last: &str,
    definition: Arc<FlowDefinition>,
) -> Option<Node> {
    if let Node::Leaf(existing) = node {
        warn!(
            "Flow {} is replaced by a namespace to register {}",
            existing.path, definition.path
        );
        *node = Node::empty_namespace();
    }
    let Node::Namespace(children) = node else {
        return None;
    };
    match parents.split_first() {
        Some((segment, rest)) => {
            let child = children
                .entry(segment.clone())
                .or_insert_with(Node::empty_namespace);
            insert(child, rest, last, definition)
        }
        None => children.insert(last.to_string(), Node::Leaf(definition)),
    }
}

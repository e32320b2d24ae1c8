//! Routes records to auxiliary outputs by the value of a field.
//!
//! The value at `field` (a dotted path) selects an entry of `routes`, which
//! names an `--out.<name>` or `--io.<name>` channel. Records without a
//! matching route continue on the primary output.

use flowline_core::flow::{Error, Flow, FlowContext, RecordReceiver, RecordSender};
use flowline_core::registry::FlowMetadata;
use flowline_core::resolve::DEFAULT_PROFILE;
use flowline_core::value::get_path;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Registration path.
pub const PATH: &str = "core.route";

/// Parameters of the route flow.
#[derive(PartialEq, Clone, Debug, Deserialize)]
pub struct Config {
    /// Dotted path of the routing field.
    pub field: String,
    /// Output channel name per field value.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

pub struct Route {
    config: Config,
    targets: BTreeMap<String, RecordSender>,
}

impl Route {
    /// Channel for a record, if its field value has a bound route.
    fn target(&self, record: &Value) -> Option<&RecordSender> {
        let key = match get_path(record, &self.config.field)? {
            Value::String(s) => s.clone(),
            Value::Object(_) | Value::Array(_) => return None,
            other => other.to_string(),
        };
        let name = self.config.routes.get(&key)?;
        self.targets.get(name)
    }
}

#[async_trait::async_trait]
impl Flow for Route {
    async fn run(
        self: Box<Self>,
        mut input: RecordReceiver,
        output: RecordSender,
    ) -> Result<(), Error> {
        while let Some(record) = input.recv().await {
            match self.target(&record) {
                Some(target) => target.send(record).await?,
                None => output.send(record).await?,
            }
        }
        Ok(())
    }
}

pub fn create(context: FlowContext) -> Result<Box<dyn Flow>, Error> {
    let config: Config =
        serde_json::from_value(context.params.clone()).map_err(|e| Error::InvalidParameter {
            name: "params".to_string(),
            reason: e.to_string(),
        })?;

    let mut channels = BTreeMap::new();
    for channel in context.outputs.into_values().chain(context.duplex.into_values()) {
        channels.entry(channel.name).or_insert(channel.output);
    }

    let mut targets = BTreeMap::new();
    for name in config.routes.values() {
        match channels.get(name) {
            Some(sender) => {
                targets.insert(name.clone(), sender.clone());
            }
            None => warn!(route = %name, "Route target is not bound, records stay on the primary output"),
        }
    }
    debug!(field = %config.field, targets = targets.len(), "Route configured");

    Ok(Box::new(Route { config, targets }))
}

pub fn metadata() -> FlowMetadata {
    FlowMetadata::titled("Routes records to named outputs by field value")
        .param("field", "Dotted path of the field to route on")
        .param("routes", "Output channel name per field value")
        .profile(DEFAULT_PROFILE, json!({"field": "type", "routes": {}}))
}

//! Counting pass-through flow.
//!
//! Forwards records unchanged. Writes a start and a finish record to the
//! logger channel and the final count to the metrics channel.

use flowline_core::flow::{Error, Flow, FlowContext, RecordReceiver, RecordSender};
use flowline_core::registry::FlowMetadata;
use serde_json::json;

/// Registration path.
pub const PATH: &str = "core.count";

pub struct Count {
    id: String,
    logger: RecordSender,
    metrics: RecordSender,
}

#[async_trait::async_trait]
impl Flow for Count {
    async fn run(
        self: Box<Self>,
        mut input: RecordReceiver,
        output: RecordSender,
    ) -> Result<(), Error> {
        self.logger
            .send(json!({"level": "info", "flow": self.id, "event": "start"}))
            .await?;

        let mut count = 0u64;
        while let Some(record) = input.recv().await {
            output.send(record).await?;
            count += 1;
        }

        self.metrics
            .send(json!({"metric": "records", "flow": self.id, "count": count}))
            .await?;
        self.logger
            .send(json!({"level": "info", "flow": self.id, "event": "finish", "count": count}))
            .await?;
        Ok(())
    }
}

pub fn create(context: FlowContext) -> Result<Box<dyn Flow>, Error> {
    Ok(Box::new(Count {
        id: context.id,
        logger: context.logger,
        metrics: context.metrics,
    }))
}

pub fn metadata() -> FlowMetadata {
    FlowMetadata::titled("Forwards records and reports how many passed")
}

//! Identity flow.

use flowline_core::flow::{Error, Flow, FlowContext, RecordReceiver, RecordSender};
use flowline_core::registry::FlowMetadata;

/// Registration path.
pub const PATH: &str = "core.pass";

/// Forwards every record unchanged.
pub struct Pass;

#[async_trait::async_trait]
impl Flow for Pass {
    async fn run(
        self: Box<Self>,
        mut input: RecordReceiver,
        output: RecordSender,
    ) -> Result<(), Error> {
        while let Some(record) = input.recv().await {
            output.send(record).await?;
        }
        Ok(())
    }
}

pub fn create(_context: FlowContext) -> Result<Box<dyn Flow>, Error> {
    Ok(Box::new(Pass))
}

pub fn metadata() -> FlowMetadata {
    FlowMetadata::titled("Forwards records unchanged")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_pass_forwards_in_order() {
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);

        let flow = tokio::spawn(Box::new(Pass).run(input_rx, output_tx));
        for i in 0..3 {
            input_tx.send(json!({"i": i})).await.unwrap();
        }
        drop(input_tx);

        for i in 0..3 {
            assert_eq!(output_rx.recv().await, Some(json!({"i": i})));
        }
        assert_eq!(output_rx.recv().await, None);
        flow.await.unwrap().unwrap();
    }
}

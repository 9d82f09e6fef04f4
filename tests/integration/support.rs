use intentbus::config::AgentSettings;
use intentbus::resolver::FnResolver;
use intentbus::{message, Fields, MessageTree, Resolver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const POLL: Duration = Duration::from_millis(20);

/// Settings tuned for fast tests: no built-ins, quick retries, short drain
pub fn test_settings(max_redeliveries: Option<u32>) -> AgentSettings {
    let mut settings = AgentSettings::default();
    settings.agent.builtin_resolvers = false;
    settings.bus.poll_timeout_ms = POLL.as_millis() as u64;
    settings.delivery.max_redeliveries = max_redeliveries;
    settings.delivery.redelivery_delay_ms = 2;
    settings.delivery.max_redelivery_delay_ms = 20;
    settings.delivery.consume_retry_delay_ms = 10;
    settings.delivery.drain_timeout_ms = 1_000;
    settings.publisher.retry_delay_ms = 5;
    settings.publisher.max_retry_delay_ms = 20;
    settings
}

/// Resolver replacing the intent with a fixed set of fields
pub fn replying(name: &str, reply: Value) -> Arc<dyn Resolver> {
    Arc::new(FnResolver::new(name, move |_, _| {
        let fields: Fields = reply.as_object().cloned().unwrap_or_default();
        Ok(fields)
    }))
}

pub fn decode_all(messages: &[Vec<u8>]) -> Vec<MessageTree> {
    messages
        .iter()
        .map(|bytes| message::decode(bytes).unwrap())
        .collect()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn ack() -> Value {
    json!({"data": "ack"})
}

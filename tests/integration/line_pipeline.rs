use super::support::{ack, replying, test_settings};
use intentbus::transport::LineTransport;
use intentbus::Agent;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn line_agent_resolves_until_input_closes() {
    let input = concat!(
        "{\"intent\":\"a\",\"n\":1}\n",
        "{\"hello\":\"world\"}\n",
        "\n",
        "{\"n\":3,\"params\":[{\"intent\":\"a\"},{\"intent\":\"b\"}]}\n",
    );
    let transport = Arc::new(LineTransport::new(
        "stdin",
        Cursor::new(input.as_bytes().to_vec()),
        Vec::new(),
        Duration::from_millis(50),
    ));

    let agent = Agent::builder("pipe")
        .settings(test_settings(Some(1)))
        .resolver(replying("a", ack()))
        .transport(transport.clone())
        .build()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), agent.run())
        .await
        .unwrap()
        .unwrap();

    let stats = agent.stats();
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.declined, 1);
    assert_eq!(stats.discarded, 1);
    drop(agent);

    let transport = Arc::try_unwrap(transport)
        .ok()
        .expect("agent released the transport");
    let written = String::from_utf8(transport.into_writer()).unwrap();
    let lines: Vec<Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![
            ack(),
            serde_json::json!({"n": 3, "params": [{"data": "ack"}, {"intent": "b"}]}),
        ]
    );
}

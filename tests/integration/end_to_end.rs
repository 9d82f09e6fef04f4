use super::support::{ack, decode_all, replying, test_settings, wait_until, POLL};
use intentbus::resolver::FnResolver;
use intentbus::transport::InMemoryBus;
use intentbus::{Agent, DomainError, Fields};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(10);

fn spawn(agent: &Arc<Agent>) -> JoinHandle<()> {
    let agent = Arc::clone(agent);
    tokio::spawn(async move {
        agent.run().await.unwrap();
    })
}

async fn shutdown(agents: &[&Arc<Agent>], handles: Vec<JoinHandle<()>>) {
    for agent in agents {
        agent.stop();
    }
    for handle in handles {
        tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_intents_resolve_across_agents() {
    let bus = InMemoryBus::new("intents");

    let users = Arc::new(
        Agent::builder("users")
            .settings(test_settings(Some(2)))
            .resolver(Arc::new(FnResolver::new("user.get", |intent, _| {
                let mut user = Fields::new();
                user.insert("email".to_string(), json!(intent.get_str("email")));
                user.insert("name".to_string(), json!("Ann"));
                Ok(user)
            })))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );
    let mailer = Arc::new(
        Agent::builder("mailer")
            .settings(test_settings(Some(2)))
            .resolver(Arc::new(FnResolver::new("mail.send", |intent, _| {
                let mut sent = Fields::new();
                sent.insert("sent".to_string(), json!(true));
                sent.insert(
                    "to".to_string(),
                    intent.get("to").cloned().unwrap_or_default(),
                );
                Ok(sent)
            })))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );

    bus.inject(
        br#"{"intent":"mail.send","to":{"intent":"user.get","email":"ann@example.com"}}"#.to_vec(),
    );
    let handles = vec![spawn(&users), spawn(&mailer)];

    let expected = json!({
        "sent": true,
        "to": {"email": "ann@example.com", "name": "Ann"}
    });
    let delivered = wait_until(WAIT, || decode_all(&bus.messages()).contains(&expected)).await;
    shutdown(&[&users, &mailer], handles).await;
    assert!(delivered, "final message never published: {:?}", decode_all(&bus.messages()));

    let messages = decode_all(&bus.messages());
    assert_eq!(
        messages[1],
        json!({
            "intent": "mail.send",
            "to": {"email": "ann@example.com", "name": "Ann"}
        })
    );
    assert_eq!(users.stats().resolved, 1);
    assert_eq!(mailer.stats().resolved, 1);
    assert!(mailer.stats().discarded >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_agent_observes_every_message() {
    let bus = InMemoryBus::new("intents");
    let make = |name: &str| {
        Arc::new(
            Agent::builder(name)
                .settings(test_settings(Some(0)))
                .resolver(replying("a", ack()))
                .transport(Arc::new(bus.connect(POLL)))
                .build()
                .unwrap(),
        )
    };
    let first = make("first");
    let second = make("second");

    bus.inject(br#"{"intent":"a"}"#.to_vec());
    let handles = vec![spawn(&first), spawn(&second)];

    let both = wait_until(WAIT, || {
        decode_all(&bus.messages())
            .iter()
            .filter(|message| **message == ack())
            .count()
            == 2
    })
    .await;
    shutdown(&[&first, &second], handles).await;

    assert!(both);
    assert_eq!(first.stats().resolved, 1);
    assert_eq!(second.stats().resolved, 1);
}

#[tokio::test]
async fn domain_errors_are_published_with_error_at_both_levels() {
    let bus = InMemoryBus::new("intents");
    let agent = Arc::new(
        Agent::builder("failing")
            .settings(test_settings(Some(0)))
            .resolver(Arc::new(
                FnResolver::new("a", |_, _| Err(DomainError::new("This is the error message.")))
                    .with_error_object(|_| {
                        let mut fields = Fields::new();
                        fields.insert("dummy".to_string(), json!("blah"));
                        fields
                    }),
            ))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );

    bus.inject(br#"{"intent":"b","args":{"intent":"a"}}"#.to_vec());
    let handle = spawn(&agent);

    let expected = json!({
        "intent": "b",
        "args": {"error": "This is the error message.", "dummy": "blah"},
        "error": "This is the error message."
    });
    let published = wait_until(WAIT, || decode_all(&bus.messages()).contains(&expected)).await;
    shutdown(&[&agent], vec![handle]).await;

    assert!(published);
    let stats = agent.stats();
    assert_eq!(stats.domain_errors, 1);
    assert_eq!(stats.resolved, 0);
}

#[tokio::test]
async fn seeded_messages_flow_through_the_publisher() {
    let bus = InMemoryBus::new("intents");
    let agent = Arc::new(
        Agent::builder("seeder")
            .settings(test_settings(Some(0)))
            .resolver(replying("a", ack()))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );

    agent.publish(&json!({"intent": "a", "seed": 1})).unwrap();
    let handle = spawn(&agent);

    let resolved = wait_until(WAIT, || decode_all(&bus.messages()).contains(&ack())).await;
    shutdown(&[&agent], vec![handle]).await;

    assert!(resolved);
    let messages = decode_all(&bus.messages());
    assert_eq!(messages[0], json!({"intent": "a", "seed": 1}));
    assert_eq!(messages[1], ack());
}

#[tokio::test]
async fn publish_failures_are_retried_in_order() {
    let bus = InMemoryBus::new("intents");
    let agent = Arc::new(
        Agent::builder("retrying")
            .settings(test_settings(Some(0)))
            .resolver(replying("a", ack()))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );

    bus.fail_next_publishes(3);
    agent.publish(&json!({"order": 1})).unwrap();
    agent.publish(&json!({"order": 2})).unwrap();
    let handle = spawn(&agent);

    let published = wait_until(WAIT, || bus.len() >= 2).await;
    shutdown(&[&agent], vec![handle]).await;

    assert!(published);
    let messages = decode_all(&bus.messages());
    assert_eq!(messages[0], json!({"order": 1}));
    assert_eq!(messages[1], json!({"order": 2}));
    assert_eq!(agent.publisher_stats().retries, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolved_messages_survive_a_publish_outage() {
    let bus = InMemoryBus::new("intents");
    let mut settings = test_settings(Some(2));
    settings.publisher.max_queue_size = 1;
    settings.publisher.retry_delay_ms = 20;
    settings.publisher.max_retry_delay_ms = 20;
    let agent = Arc::new(
        Agent::builder("backpressured")
            .settings(settings)
            .resolver(Arc::new(FnResolver::new("a", |intent, _| {
                let mut fields = Fields::new();
                fields.insert("n".to_string(), intent.get("n").cloned().unwrap_or_default());
                Ok(fields)
            })))
            .transport(Arc::new(bus.connect(POLL)))
            .build()
            .unwrap(),
    );

    bus.fail_next_publishes(10);
    for n in 0..3 {
        bus.inject(format!(r#"{{"intent":"a","n":{n}}}"#).into_bytes());
    }
    let handle = spawn(&agent);

    let expected: Vec<_> = (0..3).map(|n| json!({ "n": n })).collect();
    let all_published = wait_until(WAIT, || {
        let messages = decode_all(&bus.messages());
        expected.iter().all(|message| messages.contains(message))
    })
    .await;
    shutdown(&[&agent], vec![handle]).await;

    assert!(all_published, "published: {:?}", decode_all(&bus.messages()));
    let messages = decode_all(&bus.messages());
    for message in &expected {
        assert_eq!(messages.iter().filter(|m| *m == message).count(), 1);
    }
    assert_eq!(agent.stats().resolved, 3);
    assert_eq!(agent.publisher_stats().retries, 10);
}

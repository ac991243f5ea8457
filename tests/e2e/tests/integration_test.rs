//! Full-stack runs over loopback WebSocket

use loghub_e2e_tests::{
    framework::{TestConfig, TestFramework},
    scenarios::{RelayRestartTest, SinkToViewerTest},
    RelayFixture, TestScenario, Viewer,
};
use loghub_types::{GroupTemplate, Level, LogEvent};
use message_sink::{
    ConnectionState, LogShippingLayer, SendMode, SinkBuilder, SinkConfig, StartTimeout,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;

#[test]
fn test_framework_rejects_zero_timeout() {
    let config = TestConfig {
        timeout_secs: 0,
        ..TestConfig::default()
    };
    assert!(TestFramework::new(config).is_err());
}

#[test]
fn test_scenario_metadata() {
    let scenario = SinkToViewerTest::default();
    assert_eq!(scenario.name(), "sink_to_viewer");
    assert!(!scenario.description().is_empty());
    assert!(scenario.timeout().as_secs() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sink_to_viewer() {
    let framework = TestFramework::new(TestConfig::default()).unwrap();
    let result = framework
        .run_scenario(SinkToViewerTest {
            events: 12,
            batch_posting_limit: 5,
        })
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.metrics.messages_received, 12);
    assert!(result.metrics.batches_received >= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relay_restart() {
    let framework = TestFramework::new(TestConfig::default()).unwrap();
    let result = framework
        .run_scenario(RelayRestartTest::default())
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error_message);
    assert!(result.metrics.connect_attempts >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_to_others_skips_the_sender() {
    let relay = RelayFixture::start("127.0.0.1:0").await.unwrap();
    let mut viewer = Viewer::connect(&relay.url(), "ops", Duration::from_secs(1))
        .await
        .unwrap();

    // The producer is a member of the group too, but asks to be skipped
    let mut producer = Viewer::connect(&relay.url(), "ops", Duration::from_secs(1))
        .await
        .unwrap();
    relay.wait_for_members("ops", 2).await.unwrap();

    producer
        .connection()
        .send_one_to_others("ops", Level::Error, "from producer")
        .await
        .unwrap();

    let (messages, _) = viewer.collect(1, Duration::from_secs(5)).await.unwrap();
    assert_eq!(messages[0].message(), "from producer");
    assert!(producer
        .collect(1, Duration::from_millis(300))
        .await
        .is_err());

    viewer.close().await.unwrap();
    producer.close().await.unwrap();
    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tracing_events_reach_viewer() {
    let relay = RelayFixture::start("127.0.0.1:0").await.unwrap();
    let mut viewer = Viewer::connect(&relay.url(), "app", Duration::from_secs(1))
        .await
        .unwrap();
    relay.wait_for_members("app", 1).await.unwrap();

    let mut config = SinkConfig::with_url(relay.url());
    config.batch_posting_limit = 1;
    config.groups = vec![GroupTemplate::new("app", "{Level:u3} {Message} ({SourceContext})").unwrap()];
    let sink = SinkBuilder::new(config)
        .with_mode(SendMode::Group)
        .connect()
        .unwrap();
    sink.connection()
        .unwrap()
        .watch_state()
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();

    let subscriber = tracing_subscriber::registry().with(LogShippingLayer::new(sink.handle()));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(target: "checkout", order = 42, "order placed");
    });

    let (messages, _) = viewer.collect(1, Duration::from_secs(5)).await.unwrap();
    assert_eq!(messages[0].message(), "INF order placed (checkout)");

    sink.shutdown().await;
    viewer.close().await.unwrap();
    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bounded_start_against_missing_relay() {
    // Bind and release a port so nothing listens on it
    let relay = RelayFixture::start("127.0.0.1:0").await.unwrap();
    let url = relay.url();
    relay.stop().await;

    let sink = SinkBuilder::new(SinkConfig::with_url(url)).connect().unwrap();
    let connection = sink.connection().unwrap().clone();
    let connected = connection
        .start(StartTimeout::After(Duration::from_millis(300)), &CancellationToken::new())
        .await;
    assert!(!connected);
    assert!(connection.is_running());

    // Events are still accepted; their batches fail and are dropped
    assert!(sink.handle().emit(LogEvent::new(Level::Error, "nobody listening")));
    let stats = sink.shutdown().await;
    assert_eq!(stats.batches_dispatched, 0);
    assert!(!connection.is_running());
}

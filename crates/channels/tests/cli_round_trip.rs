use channels::{
    CliConnector, ConnectorConfig, ConnectorContext, ConnectorKind, ConnectorRuntime,
    ConnectorSpec, ConnectorState, DeliveryReport,
};
use proto::{OutgoingMessage, Shutdown};
use queue::QueueLayout;
use tokio::io::AsyncReadExt;
use tokio::time::{Duration, timeout};

#[tokio::test]
async fn cli_connector_round_trip_through_queues() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    let spec = ConnectorSpec::new(
        "cli-test",
        ConnectorKind::Cli,
        ConnectorConfig::default().with("username", "tester"),
    );
    let ctx = ConnectorContext::new(&spec, layout.clone()).expect("context");

    let input = std::io::Cursor::new(b"message 0\nmessage 1\nmessage 2\n".to_vec());
    let (output, mut terminal) = tokio::io::duplex(8192);
    let connector = CliConnector::with_io("tester", input, output);
    let mut runtime = ConnectorRuntime::new(Box::new(connector), ctx);

    // Input EOF ends the run loop on its own.
    let shutdown = Shutdown::new();
    timeout(Duration::from_secs(5), runtime.run(shutdown.signal()))
        .await
        .expect("runtime finished")
        .expect("clean stop");
    assert_eq!(runtime.state(), ConnectorState::Stopped);

    let inbox = runtime.context().inbox();
    let drained = inbox.drain().expect("drain inbox");
    let texts: Vec<_> = drained
        .iter()
        .map(|e| e.record.content.text.as_str())
        .collect();
    assert_eq!(texts, vec!["message 0", "message 1", "message 2"]);
    assert!(drained.iter().all(|e| e.record.connector.instance == "cli-test"));
    assert!(drained.iter().all(|e| e.record.sender.username == "tester"));

    let outbox = runtime.context().outbox();
    outbox
        .enqueue(&OutgoingMessage::new("cli-test", "cli", "reply"))
        .expect("enqueue reply");
    let report = runtime.process_outbox().await.expect("deliver");
    assert_eq!(report, DeliveryReport { sent: 1, failed: 0 });
    assert!(outbox.pending().expect("list outbox").is_empty());
    assert!(layout.logs_dir().is_dir());

    drop(runtime);
    let mut printed = String::new();
    terminal
        .read_to_string(&mut printed)
        .await
        .expect("read terminal");
    assert!(printed.contains("[seed] reply"));
}

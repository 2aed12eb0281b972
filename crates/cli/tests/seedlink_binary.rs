use std::path::Path;
use std::process::Command;

use proto::{ConnectorInfo, Content, Conversation, ConversationKind, Message, Sender};
use queue::{Inbox, Outbox, QueueLayout};

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("seedlink.toml");
    let home = dir.join("home");
    std::fs::write(
        &path,
        format!("home = {:?}\n{body}", home.to_string_lossy()),
    )
    .expect("write config");
    path
}

fn seedlink(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_seedlink"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("SEEDLINK_HOME")
        .output()
        .expect("run seedlink")
}

#[test]
fn reply_command_queues_into_connector_outbox() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path(), "");

    let out = seedlink(
        &config,
        &["reply", "--connector", "cli-test", "--conversation", "cli", "--text", "reply"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let layout = QueueLayout::new(tmp.path().join("home"));
    let drained = Outbox::new(&layout, "cli-test")
        .expect("outbox")
        .drain()
        .expect("drain");
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].record.text, "reply");
    assert_eq!(drained[0].record.conversation_id, "cli");
}

#[test]
fn inbox_command_prints_and_consumes_messages() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path(), "");
    let layout = QueueLayout::new(tmp.path().join("home"));
    layout.ensure_shared().expect("dirs");
    let inbox = Inbox::new(&layout);
    for i in 0..3 {
        inbox
            .enqueue(&Message::new(
                ConnectorInfo::new("cli", "cli-test"),
                Sender::new("user", "user"),
                Content::text(format!("message {i}")),
                Conversation::new("cli", ConversationKind::Dm),
            ))
            .expect("enqueue");
    }

    let out = seedlink(&config, &["inbox"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).expect("utf8");
    let texts: Vec<String> = stdout
        .lines()
        .map(|line| {
            Message::from_json(line.as_bytes())
                .expect("json line")
                .content
                .text
        })
        .collect();
    assert_eq!(texts, vec!["message 0", "message 1", "message 2"]);
    assert!(inbox.pending().expect("list").is_empty());
}

#[test]
fn start_rejects_unknown_connector_type() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        tmp.path(),
        "[[connectors]]\nname = \"pigeon\"\ntype = \"carrier-pigeon\"\n",
    );
    let out = seedlink(&config, &["start"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("carrier-pigeon"));
}

#[cfg(unix)]
#[tokio::test]
async fn supervisor_runs_webhook_worker_until_sigterm() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use tokio::time::{Duration, sleep, timeout};

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        tmp.path(),
        &format!(
            "[supervisor]\nshutdown_timeout_secs = 3.0\n\n[[connectors]]\nname = \"hooks\"\ntype = \"webhook\"\nhost = \"127.0.0.1\"\nport = {port}\nsecret = \"abc\"\n"
        ),
    );

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_seedlink"))
        .arg("--config")
        .arg(&config)
        .arg("start")
        .env_remove("SEEDLINK_HOME")
        .kill_on_drop(true)
        .spawn()
        .expect("spawn supervisor");

    let base = format!("http://127.0.0.1:{port}/webhook");
    let client = reqwest::Client::new();
    let mut healthy = false;
    for _ in 0..400 {
        if let Ok(resp) = client.get(format!("{base}/health")).send().await
            && resp.status().is_success()
        {
            healthy = true;
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }
    assert!(healthy, "webhook worker never became healthy");

    let resp = client
        .post(&base)
        .header("X-Webhook-Secret", "abc")
        .json(&serde_json::json!({ "sender": "bob", "text": "ping" }))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 200);

    let home = tmp.path().join("home");
    assert!(home.join("seedlink.pid").exists());
    assert!(home.join("logs/hooks.log").exists());
    let inbox = Inbox::new(&QueueLayout::new(&home));
    let drained = inbox.drain().expect("drain");
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].record.content.text, "ping");

    let pid = child.id().expect("supervisor pid");
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).expect("sigterm");
    let status = timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("supervisor exited in time")
        .expect("wait");
    assert!(status.success());
    assert!(!home.join("seedlink.pid").exists());
}

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use proto::{ConnectorInfo, Content, Conversation, ConversationKind, Message, OutgoingMessage, Sender};
use queue::{Inbox, Outbox, QueueLayout, pending};

fn cli_message(instance: &str, text: &str) -> Message {
    Message::new(
        ConnectorInfo::new("cli", instance),
        Sender::new("u1", "user"),
        Content::text(text),
        Conversation::new("cli", ConversationKind::Dm),
    )
}

#[test]
fn inbox_listing_follows_write_order() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    layout.ensure_for("cli-test").expect("ensure");
    let inbox = Inbox::new(&layout);

    for i in 0..3 {
        inbox
            .enqueue(&cli_message("cli-test", &format!("message {i}")))
            .expect("enqueue");
    }

    let texts: Vec<String> = inbox
        .pending()
        .expect("list")
        .iter()
        .map(|name| {
            let bytes = fs::read(inbox.dir().join(name)).expect("read");
            Message::from_json(&bytes).expect("parse").content.text
        })
        .collect();
    assert_eq!(texts, vec!["message 0", "message 1", "message 2"]);
}

#[test]
fn outbox_reply_is_drained_exactly_once() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    let outbox = Outbox::new(&layout, "cli-test").expect("outbox");
    outbox
        .enqueue(&OutgoingMessage::new("cli-test", "cli", "reply"))
        .expect("enqueue");

    let first = outbox.drain().expect("drain");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].record.text, "reply");
    assert!(outbox.pending().expect("list").is_empty());
    assert!(outbox.drain().expect("second drain").is_empty());
}

#[test]
fn concurrent_drains_never_share_an_entry() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    let outbox = Arc::new(Outbox::new(&layout, "busy").expect("outbox"));
    for i in 0..200 {
        outbox
            .enqueue(&OutgoingMessage::new("busy", "c", format!("m{i}")))
            .expect("enqueue");
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let outbox = outbox.clone();
            thread::spawn(move || {
                outbox
                    .drain()
                    .expect("drain")
                    .into_iter()
                    .map(|e| e.record.text)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for reader in readers {
        for text in reader.join().expect("reader thread") {
            total += 1;
            assert!(seen.insert(text), "entry delivered twice");
        }
    }
    assert_eq!(total, 200);
    assert!(outbox.pending().expect("list").is_empty());
}

#[test]
fn concurrent_producers_do_not_collide() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    let inbox = Arc::new(Inbox::new(&layout));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let inbox = inbox.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    inbox
                        .enqueue(&cli_message(&format!("writer-{w}"), &format!("{w}-{i}")))
                        .expect("enqueue");
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let drained = inbox.drain().expect("drain");
    assert_eq!(drained.len(), 100);
    let unique: HashSet<_> = drained.iter().map(|e| e.record.id.clone()).collect();
    assert_eq!(unique.len(), 100);
}

#[test]
fn poison_files_are_conserved_in_failed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    layout.ensure_for("cli-test").expect("ensure");
    let outbox = Outbox::new(&layout, "cli-test").expect("outbox");

    fs::write(outbox.dir().join("out_1.json"), "{invalid json").expect("write");
    fs::write(
        outbox.dir().join("out_2.json"),
        r#"{"connector_instance": "cli-test", "text": "no conversation"}"#,
    )
    .expect("write");
    outbox
        .enqueue(&OutgoingMessage::new("cli-test", "cli", "good"))
        .expect("enqueue");
    let before = pending(outbox.dir()).expect("list").len() + pending(&layout.failed_dir()).expect("list").len();

    let drained = outbox.drain().expect("drain");
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].record.text, "good");

    let failed = pending(&layout.failed_dir()).expect("list");
    assert_eq!(failed, vec!["out_1.json".to_string(), "out_2.json".to_string()]);
    let after = pending(outbox.dir()).expect("list").len() + failed.len() + drained.len();
    assert_eq!(before, after);
}

#[test]
fn outboxes_are_isolated_per_instance() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = QueueLayout::new(tmp.path());
    let a = Outbox::new(&layout, "A").expect("outbox A");
    let b = Outbox::new(&layout, "B").expect("outbox B");
    assert_ne!(a.dir(), b.dir());

    a.enqueue(&OutgoingMessage::new("A", "c", "for A")).expect("enqueue A");
    b.enqueue(&OutgoingMessage::new("B", "c", "for B")).expect("enqueue B");

    let drained_a = a.drain().expect("drain A");
    assert_eq!(drained_a.len(), 1);
    assert_eq!(drained_a[0].record.text, "for A");
    assert_eq!(b.pending().expect("list B").len(), 1);
}

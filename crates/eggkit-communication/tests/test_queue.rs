use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eggkit_communication::{LineListener, ProtocolLink, RawWriter};
use eggkit_core::TransportError;

// Mock raw writer for driving the queue without a transport
struct MockWriter {
    sent: Arc<Mutex<Vec<String>>>,
    fail_first: AtomicUsize,
}

impl MockWriter {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::new(Self {
            sent: sent.clone(),
            fail_first: AtomicUsize::new(0),
        });
        (writer, sent)
    }

    fn failing(count: usize) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let (writer, sent) = Self::new();
        writer.fail_first.store(count, Ordering::SeqCst);
        (writer, sent)
    }
}

#[async_trait]
impl RawWriter for MockWriter {
    async fn write_raw(&self, text: &str) -> eggkit_core::Result<()> {
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::write_failed("simulated write failure"));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn connected_link() -> (Arc<ProtocolLink>, Arc<Mutex<Vec<String>>>) {
    let link = ProtocolLink::new();
    let (writer, sent) = MockWriter::new();
    link.attach_writer(writer);
    (link, sent)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn line_mode_resolves_with_first_line() {
    let (link, sent) = connected_link();

    let pending = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command("V").await }
    });
    settle().await;
    assert_eq!(sent.lock().unwrap().as_slice(), ["V\r"]);

    link.ingest_text("V,2.9.1\r\nignored-afterwards\r\n").await;
    assert_eq!(pending.await.unwrap().unwrap(), "V,2.9.1");
    assert!(!link.is_busy());
}

#[tokio::test]
async fn expect_ok_accumulates_lines_before_the_sentinel() {
    let (link, _sent) = connected_link();

    let pending = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command_expect_ok("QB", None).await }
    });
    settle().await;

    link.ingest_text("L1\r\nL2\r\n").await;
    assert!(link.is_busy());
    link.ingest_text("OK\r\n").await;

    assert_eq!(pending.await.unwrap().unwrap(), vec!["L1", "L2"]);
}

#[tokio::test]
async fn unknown_command_rejects_with_accumulated_payload() {
    let (link, _sent) = connected_link();

    let pending = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command_expect_ok("XY,1", None).await }
    });
    settle().await;

    link.ingest_text("L1\r\nUnknown CMD: XYZ\r\n").await;

    let err = pending.await.unwrap().unwrap_err();
    match err {
        TransportError::UnknownCommand { response } => {
            assert_eq!(response, "L1\nUnknown CMD: XYZ");
        }
        other => panic!("expected UnknownCommand, got {other:?}"),
    }
}

#[tokio::test]
async fn commands_are_normalized_to_a_single_trailing_cr() {
    let (link, sent) = connected_link();

    let first = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command("SM,1000,100,0").await }
    });
    settle().await;
    link.ingest_text("ok\r\n").await;
    first.await.unwrap().unwrap();

    let second = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command("SP,1\r").await }
    });
    settle().await;
    link.ingest_text("ok\r\n").await;
    second.await.unwrap().unwrap();

    assert_eq!(sent.lock().unwrap().as_slice(), ["SM,1000,100,0\r", "SP,1\r"]);
}

#[tokio::test]
async fn commands_settle_in_submission_order_one_at_a_time() {
    let (link, sent) = connected_link();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let link = Arc::clone(&link);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let lines = link
                .send_command_expect_ok(&format!("SM,{i}"), None)
                .await
                .unwrap();
            order.lock().unwrap().push(i);
            lines
        }));
        // Serialize submissions so FIFO order is well-defined.
        settle().await;
    }

    // Only the head command has been written so far.
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(link.queued_len(), 2);

    for _ in 0..3 {
        link.ingest_text("ok\r\n").await;
        settle().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(order.lock().unwrap().as_slice(), [0, 1, 2]);
    assert_eq!(
        sent.lock().unwrap().as_slice(),
        ["SM,0\r", "SM,1\r", "SM,2\r"]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_rejects_and_dispatches_the_next_command() {
    let (link, sent) = connected_link();

    let first = tokio::spawn({
        let link = Arc::clone(&link);
        async move {
            link.send_command_expect_ok("SM,1", Some(Duration::from_millis(1200)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn({
        let link = Arc::clone(&link);
        async move {
            link.send_command_expect_ok("SM,2", Some(Duration::from_millis(1200)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sent.lock().unwrap().len(), 1);

    // Let the first command's timer fire; the second dispatches
    // immediately after.
    tokio::time::sleep(Duration::from_millis(1250)).await;

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        TransportError::ResponseTimeout { timeout_ms: 1200 }
    ));
    assert_eq!(sent.lock().unwrap().len(), 2);

    link.ingest_text("ok\r\n").await;
    assert!(second.await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn disconnect_rejects_active_and_queued_commands() {
    let (link, _sent) = connected_link();

    let mut handles = Vec::new();
    for i in 0..3 {
        let link = Arc::clone(&link);
        handles.push(tokio::spawn(async move {
            link.send_command_expect_ok(&format!("SM,{i}"), None).await
        }));
        settle().await;
    }
    assert!(link.is_busy());
    assert_eq!(link.queued_len(), 2);

    link.teardown(TransportError::disconnected("unit test teardown"));

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { .. }));
    }
    assert!(!link.is_busy());
    assert_eq!(link.queued_len(), 0);
    assert!(!link.is_attached());
}

#[tokio::test]
async fn write_failure_rejects_and_moves_on() {
    let link = ProtocolLink::new();
    let (writer, sent) = MockWriter::failing(1);
    link.attach_writer(writer);

    let first = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command_expect_ok("SM,1", None).await }
    });
    settle().await;
    let second = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command_expect_ok("SM,2", None).await }
    });
    settle().await;

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, TransportError::WriteFailed { .. }));

    // The failed command never reached the wire; the next one did.
    link.ingest_text("ok\r\n").await;
    second.await.unwrap().unwrap();
    assert_eq!(sent.lock().unwrap().as_slice(), ["SM,2\r"]);
}

#[tokio::test]
async fn submitting_while_detached_fails_fast() {
    let link = ProtocolLink::new();
    let err = link.send_command("V").await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

struct CountingListener {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LineListener for CountingListener {
    fn on_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

#[tokio::test]
async fn listeners_see_every_line_including_unclaimed_ones() {
    let (link, _sent) = connected_link();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let handle = link.register_line_listener(Arc::new(CountingListener {
        lines: Arc::clone(&lines),
    }));

    // No command active: the line is dropped for classification but
    // still reaches the listener.
    link.ingest_text("stray\r\n").await;

    let pending = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send_command("QP").await }
    });
    settle().await;
    link.ingest_text("1\r\n").await;
    pending.await.unwrap().unwrap();

    assert_eq!(lines.lock().unwrap().as_slice(), ["stray", "1"]);

    link.unregister_line_listener(&handle);
    link.ingest_text("after\r\n").await;
    assert_eq!(lines.lock().unwrap().len(), 2);
    assert_eq!(link.listener_count(), 0);
}

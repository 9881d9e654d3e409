//! Desktop mail-client dispatch against an in-memory session.

mod common;

use common::*;
use publipostage::mail::{
    DesktopClientDispatcher, DispatchError, Dispatcher, OutgoingMail, RetryPolicy,
    SignatureOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn mail(attachments: Vec<PathBuf>) -> OutgoingMail {
    OutgoingMail {
        to: "alice@example.com".to_string(),
        subject: "Soumission - Alice".to_string(),
        html_body: "<p>Bonjour</p>".to_string(),
        attachments,
        from_account: None,
        cc: vec!["suivi@example.com".to_string()],
        bcc: Vec::new(),
    }
}

fn no_signature() -> SignatureOptions {
    SignatureOptions::default()
}

fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(secs), "elapsed {:?}", elapsed);
    assert!(
        elapsed < Duration::from_secs(secs) + Duration::from_millis(100),
        "elapsed {:?}",
        elapsed
    );
}

fn count(calls: &[String], name: &str) -> usize {
    calls.iter().filter(|call| call.as_str() == name).count()
}

#[tokio::test(start_paused = true)]
async fn test_transient_send_failures_are_retried_with_delay() {
    let dispatcher = DesktopClientDispatcher::new(
        FakeSession::with_send_failures(2),
        no_signature(),
        RetryPolicy::new(5, Duration::from_secs(2)),
    );

    let start = Instant::now();
    dispatcher.send(&mail(Vec::new())).await.unwrap();

    assert_elapsed(start, 4);
    assert_eq!(count(&dispatcher.session().calls(), "send"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_report_attempts() {
    let dispatcher = DesktopClientDispatcher::new(
        FakeSession::with_send_failures(10),
        no_signature(),
        RetryPolicy::new(3, Duration::from_secs(2)),
    );

    let start = Instant::now();
    let error = dispatcher.send(&mail(Vec::new())).await.unwrap_err();

    assert_elapsed(start, 4);
    match error {
        DispatchError::Exhausted {
            recipient,
            attempts,
            last_error,
        } => {
            assert_eq!(recipient, "alice@example.com");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("rejected by callee"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&dispatcher.session().calls(), "send"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_failure_returns_at_once() {
    let session = FakeSession {
        send_error: Some("Access denied".to_string()),
        ..FakeSession::default()
    };
    let dispatcher = DesktopClientDispatcher::new(
        session,
        no_signature(),
        RetryPolicy::new(5, Duration::from_secs(2)),
    );

    let start = Instant::now();
    let error = dispatcher.send(&mail(Vec::new())).await.unwrap_err();

    assert_elapsed(start, 0);
    assert!(matches!(error, DispatchError::Session(_)));
    assert_eq!(count(&dispatcher.session().calls(), "send"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_message_creation_is_retried() {
    let session = FakeSession::default();
    session
        .create_failures
        .store(1, std::sync::atomic::Ordering::SeqCst);
    let dispatcher = DesktopClientDispatcher::new(
        session,
        no_signature(),
        RetryPolicy::new(3, Duration::from_secs(1)),
    );

    let start = Instant::now();
    dispatcher.send(&mail(Vec::new())).await.unwrap();

    assert_elapsed(start, 1);
    assert_eq!(count(&dispatcher.session().calls(), "create_message"), 2);
}

#[tokio::test]
async fn test_send_steps_in_order() {
    let session = FakeSession {
        known_accounts: vec!["bureau@example.com".to_string()],
        ..FakeSession::default()
    };
    let dispatcher = DesktopClientDispatcher::new(session, no_signature(), RetryPolicy::once());

    let mut message = mail(vec![PathBuf::from("/tmp/01_Alice.pdf")]);
    message.from_account = Some("bureau@example.com".to_string());
    dispatcher.send(&message).await.unwrap();

    let session = dispatcher.session();
    assert_eq!(
        session.calls(),
        vec![
            "ensure_ready",
            "create_message",
            "select_account",
            "set_envelope",
            "set_html_body",
            "attach",
            "save",
            "send",
        ]
    );

    let envelope = session.envelopes.lock()[0].clone();
    assert_eq!(envelope.to, "alice@example.com");
    assert_eq!(envelope.cc, "suivi@example.com");
    assert_eq!(envelope.subject, "Soumission - Alice");
    assert_eq!(session.bodies.lock()[0], "<p>Bonjour</p>");
    assert_eq!(
        session.attachments.lock()[0],
        (PathBuf::from("/tmp/01_Alice.pdf"), None)
    );
}

#[tokio::test]
async fn test_unknown_account_still_sends() {
    let dispatcher = DesktopClientDispatcher::new(FakeSession::default(), no_signature(), RetryPolicy::once());

    let mut message = mail(Vec::new());
    message.from_account = Some("inconnu@example.com".to_string());

    dispatcher.send(&message).await.unwrap();
    assert_eq!(count(&dispatcher.session().calls(), "send"), 1);
}

#[tokio::test]
async fn test_prepare_lists_accounts() {
    let dispatcher = DesktopClientDispatcher::new(FakeSession::default(), no_signature(), RetryPolicy::once());

    dispatcher.prepare().await.unwrap();

    assert_eq!(dispatcher.session().calls(), vec!["ensure_ready", "accounts"]);
}

fn signature_dir(dir: &Path) -> PathBuf {
    let signatures = dir.join("Signatures");
    fs::create_dir_all(signatures.join("Bureau_files")).unwrap();
    fs::write(
        signatures.join("Bureau.htm"),
        r#"<p>Cordialement</p><img src="Bureau_files/logo.png">"#,
    )
    .unwrap();
    fs::write(signatures.join("Bureau_files").join("logo.png"), b"png").unwrap();
    signatures
}

#[tokio::test]
async fn test_named_signature_images_are_embedded() {
    let dir = TempDir::new().unwrap();
    let signatures = signature_dir(dir.path());
    let options = SignatureOptions {
        name: Some("Bureau".to_string()),
        embed_images: true,
        signatures_dir: signatures.clone(),
        ..SignatureOptions::default()
    };
    let dispatcher = DesktopClientDispatcher::new(FakeSession::default(), options, RetryPolicy::once());

    dispatcher
        .send(&mail(vec![PathBuf::from("/tmp/01_Alice.pdf")]))
        .await
        .unwrap();

    let session = dispatcher.session();
    let body = session.bodies.lock()[0].clone();
    assert!(body.starts_with("<p>Bonjour</p><p>Cordialement</p>"));
    assert!(body.contains(r#"src="cid:logo_png""#));

    let attachments = session.attachments.lock().clone();
    assert_eq!(attachments.len(), 2);
    assert_eq!(
        attachments[0],
        (
            signatures.join("Bureau_files").join("logo.png"),
            Some("logo_png".to_string())
        )
    );
    assert_eq!(attachments[1].1, None);
}

#[tokio::test]
async fn test_signature_images_left_alone_without_embedding() {
    let dir = TempDir::new().unwrap();
    let options = SignatureOptions {
        use_system: true,
        signatures_dir: signature_dir(dir.path()),
        ..SignatureOptions::default()
    };
    let dispatcher = DesktopClientDispatcher::new(FakeSession::default(), options, RetryPolicy::once());

    dispatcher.send(&mail(Vec::new())).await.unwrap();

    let session = dispatcher.session();
    assert!(session.bodies.lock()[0].contains(r#"src="Bureau_files/logo.png""#));
    assert!(session.attachments.lock().is_empty());
}

#[tokio::test]
async fn test_client_default_signature_is_looked_up_once() {
    let dir = TempDir::new().unwrap();
    let signatures = signature_dir(dir.path());
    fs::write(signatures.join("Accueil.htm"), "<p>Accueil</p>").unwrap();
    let session = FakeSession {
        default_signature: Some("Bureau".to_string()),
        ..FakeSession::default()
    };
    let options = SignatureOptions {
        use_system: true,
        signatures_dir: signatures,
        ..SignatureOptions::default()
    };
    let dispatcher = DesktopClientDispatcher::new(session, options, RetryPolicy::once());

    dispatcher.send(&mail(Vec::new())).await.unwrap();
    dispatcher.send(&mail(Vec::new())).await.unwrap();

    let session = dispatcher.session();
    assert_eq!(count(&session.calls(), "default_signature_name"), 1);
    for body in session.bodies.lock().iter() {
        assert!(body.contains("<p>Cordialement</p>"));
        assert!(!body.contains("Accueil"));
    }
}

#[tokio::test]
async fn test_named_signature_skips_client_default_lookup() {
    let dir = TempDir::new().unwrap();
    let options = SignatureOptions {
        name: Some("Bureau".to_string()),
        use_system: true,
        signatures_dir: signature_dir(dir.path()),
        ..SignatureOptions::default()
    };
    let dispatcher = DesktopClientDispatcher::new(FakeSession::default(), options, RetryPolicy::once());

    dispatcher.send(&mail(Vec::new())).await.unwrap();

    assert_eq!(count(&dispatcher.session().calls(), "default_signature_name"), 0);
}

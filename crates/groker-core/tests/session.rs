//! End-to-end session runs against a scripted loopback server.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use groker_core::{
    Attempt, AuthFailure, ConnectionConfig, Credentials, Fault, MemorySink, MessageSpec, Outcome,
    Reporter, SendFailure, Session, SessionState, Severity, TransportRequest, exit_code,
};
use groker_smtp::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use groker_smtp::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

const BODY: &str = "<body>";
const HANDSHAKE: &str = "<handshake>";
const GREETING: &str = "220 mx.test ESMTP ready\r\n";

/// A throwaway certificate for 127.0.0.1 and a client config trusting it.
struct TestCert {
    acceptor: TlsAcceptor,
    client: Arc<ClientConfig>,
}

impl TestCert {
    fn new() -> Self {
        let generated = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
        let cert: CertificateDer<'static> = generated.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            generated.key_pair.serialize_der(),
        ));

        let server = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key)
            .unwrap();
        let mut roots = RootCertStore::empty();
        roots.add(cert).unwrap();
        let client = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            acceptor: TlsAcceptor::from(Arc::new(server)),
            client: Arc::new(client),
        }
    }
}

async fn next_line<S>(stream: &mut BufStream<S>) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    match stream.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

async fn exchange<S>(
    stream: &mut BufStream<S>,
    expect: &str,
    reply: &str,
    received: &mut Vec<String>,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if expect == BODY {
        loop {
            let Some(line) = next_line(stream).await else {
                return false;
            };
            let done = line == ".";
            received.push(line);
            if done {
                break;
            }
        }
    } else if !expect.is_empty() {
        let Some(line) = next_line(stream).await else {
            return false;
        };
        assert!(
            line.starts_with(expect),
            "expected {expect:?}, got {line:?}"
        );
        received.push(line);
    }
    stream.write_all(reply.as_bytes()).await.is_ok() && stream.flush().await.is_ok()
}

/// Plays `script` to one client, switching to TLS at a [`HANDSHAKE`] step.
/// The socket is dropped as soon as the script runs out.
async fn serve_with(
    script: Vec<(&'static str, &'static str)>,
    tls: Option<TlsAcceptor>,
) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut plain = BufStream::new(socket);
        let mut received = Vec::new();

        let mut clear = script;
        let secure = clear
            .iter()
            .position(|(expect, _)| *expect == HANDSHAKE)
            .map(|at| clear.split_off(at).split_off(1));

        for (expect, reply) in clear {
            if !exchange(&mut plain, expect, reply, &mut received).await {
                return received;
            }
        }

        if let Some(rest) = secure {
            let acceptor = tls.expect("script asks for TLS");
            let Ok(stream) = acceptor.accept(plain.into_inner()).await else {
                return received;
            };
            let mut stream = BufStream::new(stream);
            for (expect, reply) in rest {
                if !exchange(&mut stream, expect, reply, &mut received).await {
                    break;
                }
            }
        }

        received
    });

    (port, handle)
}

async fn serve(script: Vec<(&'static str, &'static str)>) -> (u16, JoinHandle<Vec<String>>) {
    serve_with(script, None).await
}

fn plaintext(port: u16) -> ConnectionConfig {
    let transport = TransportRequest {
        port: Some(port),
        ..TransportRequest::default()
    }
    .resolve();
    ConnectionConfig::new("127.0.0.1", transport).with_client_name("client.test")
}

fn starttls(port: u16) -> ConnectionConfig {
    let transport = TransportRequest {
        tls: true,
        port: Some(port),
        ..TransportRequest::default()
    }
    .resolve();
    ConnectionConfig::new("127.0.0.1", transport)
}

fn implicit_ssl(port: u16) -> ConnectionConfig {
    let transport = TransportRequest {
        ssl: true,
        port: Some(port),
        ..TransportRequest::default()
    }
    .resolve();
    ConnectionConfig::new("127.0.0.1", transport)
}

fn attempt(credentials: Option<Credentials>, recipients: &[&str], dry_run: bool) -> Attempt {
    let recipients: Vec<String> = recipients.iter().map(ToString::to_string).collect();
    Attempt {
        credentials,
        message: MessageSpec::new("ops@example.com", &recipients, "SMTP e-mail test", "hello")
            .unwrap(),
        dry_run,
    }
}

fn texts(sink: &MemorySink, severity: Severity) -> Vec<String> {
    sink.at_least(severity)
        .into_iter()
        .map(|e| e.text)
        .collect()
}

#[tokio::test]
async fn test_dry_run_authenticates_but_sends_nothing() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO client.test", "250-mx.test\r\n250 AUTH PLAIN\r\n"),
        ("AUTH PLAIN", "235 2.7.0 Accepted\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let outcome = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["noc@x.com"],
            true,
        ))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::DryRun);
    assert_eq!(
        session.history(),
        [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::SecureIfRequested,
            SessionState::AuthenticatedIfRequired,
            SessionState::DryRun,
            SessionState::Closed,
        ]
    );

    let sink = reporter.sink();
    assert!(texts(sink, Severity::Info).contains(&"Dry-run enabled. No message sent".to_string()));
    assert!(
        texts(sink, Severity::Warning)
            .iter()
            .any(|t| t.contains("unencrypted"))
    );
    assert!(sink.entries().iter().any(|e| e.text == "235 - 2.7.0 Accepted"));
    assert!(
        sink.entries()
            .iter()
            .all(|e| !e.text.contains("secret"))
    );

    let received = server.await.unwrap();
    assert!(received.iter().all(|l| !l.starts_with("MAIL")));
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_partial_refusal_still_succeeds() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("MAIL FROM:<ops@example.com>", "250 OK\r\n"),
        ("RCPT TO:<a@x.com>", "550 mailbox unavailable\r\n"),
        ("RCPT TO:<b@x.com>", "250 OK\r\n"),
        ("DATA", "354 go ahead\r\n"),
        (BODY, "250 queued\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session
        .run(&attempt(None, &["a@x.com", "b@x.com"], false))
        .await;
    assert_eq!(exit_code(&result), 0);

    let Outcome::Sent { refused } = result.unwrap() else {
        panic!("expected a send");
    };
    assert_eq!(refused.len(), 1);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.history().contains(&SessionState::Sent));

    let sink = reporter.sink();
    assert_eq!(
        texts(sink, Severity::Error),
        [
            "One or more recipients failed.",
            "a@x.com: 550 mailbox unavailable",
        ]
    );
    assert!(
        texts(sink, Severity::Info)
            .contains(&"Successfully sent email for one or more recipients.".to_string())
    );

    let received = server.await.unwrap();
    assert!(received.iter().any(|l| l == "Subject: SMTP e-mail test"));
}

#[tokio::test]
async fn test_rejected_login_is_reported_and_closed() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250-mx.test\r\n250 AUTH PLAIN LOGIN\r\n"),
        ("AUTH PLAIN", "535 5.7.8 Authentication credentials invalid\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session
        .run(&attempt(
            Some(Credentials::new("ops", "wrong")),
            &["a@x.com"],
            false,
        ))
        .await;

    assert_eq!(exit_code(&result), 1);
    assert!(matches!(result, Err(Fault::Authentication { ref user, .. }) if user == "ops"));
    assert_eq!(
        session.history(),
        [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::SecureIfRequested,
            SessionState::Closed,
        ]
    );

    let sink = reporter.sink();
    assert_eq!(
        texts(sink, Severity::Error),
        [
            "Authentication failed for user 'ops'",
            "535 5.7.8 Authentication credentials invalid",
        ]
    );
    assert_eq!(sink.at_least(Severity::Critical).len(), 1);

    let received = server.await.unwrap();
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_sender_policy_failure() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("MAIL FROM", "553 5.7.1 Sender address rejected\r\n"),
        ("RSET", "250 OK\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    assert!(matches!(result, Err(Fault::SenderPolicy { code: 553, .. })));
    assert_eq!(
        texts(reporter.sink(), Severity::Error),
        [
            "Failed to meet sender restrictions for ops@example.com.",
            "553 5.7.1 Sender address rejected",
        ]
    );

    server.await.unwrap();
}

#[tokio::test]
async fn test_every_recipient_refused_fails() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("MAIL FROM", "250 OK\r\n"),
        ("RCPT TO", "550 no such user\r\n"),
        ("RSET", "250 OK\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    assert!(matches!(
        result,
        Err(Fault::Send(SendFailure::Recipients(ref refused))) if refused.len() == 1
    ));
    assert_eq!(exit_code(&result), 1);
    assert!(!session.history().contains(&SessionState::Sent));

    server.await.unwrap();
}

#[tokio::test]
async fn test_starttls_not_offered() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(starttls(port), &reporter);
    let result = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["a@x.com"],
            false,
        ))
        .await;

    assert!(matches!(result, Err(Fault::SecureUpgrade(_))));
    assert_eq!(
        texts(reporter.sink(), Severity::Error)[0],
        "STARTTLS negotiation failed"
    );

    // no AUTH was attempted over the plaintext link
    let received = server.await.unwrap();
    assert!(received.iter().all(|l| !l.starts_with("AUTH")));
}

#[tokio::test]
async fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    assert!(matches!(result, Err(Fault::Connection { .. })));
    assert_eq!(
        session.history(),
        [SessionState::Disconnected, SessionState::Closed]
    );
    assert_eq!(
        texts(reporter.sink(), Severity::Error)[0],
        format!("Unable to connect to mail host: 127.0.0.1:{port}")
    );
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(socket);
    });

    let reporter = Reporter::new(MemorySink::default());
    let config = plaintext(port).with_timeout(Duration::from_secs(1));
    let mut session = Session::new(config, &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    match result {
        Err(Fault::Connection { source, .. }) => {
            assert!(matches!(source, groker_smtp::Error::Timeout(1)));
        }
        other => panic!("expected a connection fault, got {other:?}"),
    }

    server.abort();
}

#[tokio::test]
async fn test_session_runs_once() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("QUIT", "221 bye\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let dry = attempt(None, &["a@x.com"], true);

    assert!(session.run(&dry).await.is_ok());
    assert!(matches!(
        session.run(&dry).await,
        Err(Fault::Generic { .. })
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn test_hang_up_after_sender_refusal_keeps_the_sender_fault() {
    // RSET and QUIT both hit a closed socket
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250 mx.test\r\n"),
        ("MAIL FROM", "553 no\r\n"),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    assert!(matches!(
        result,
        Err(Fault::SenderPolicy { ref sender, code: 553, .. }) if sender == "ops@example.com"
    ));
    assert_eq!(session.state(), SessionState::Closed);

    let sink = reporter.sink();
    assert_eq!(
        texts(sink, Severity::Error),
        [
            "Failed to meet sender restrictions for ops@example.com.",
            "553 no",
        ]
    );
    assert!(sink.entries().iter().any(|e| e.severity == Severity::Trace
        && e.text.starts_with("Ignoring error while closing")));

    server.await.unwrap();
}

#[tokio::test]
async fn test_hang_up_during_auth() {
    let (port, server) = serve(vec![
        ("", GREETING),
        ("EHLO", "250-mx.test\r\n250 AUTH PLAIN\r\n"),
        ("AUTH PLAIN", ""),
    ])
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(plaintext(port), &reporter);
    let result = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["a@x.com"],
            false,
        ))
        .await;

    match result {
        Err(Fault::Authentication {
            reason: AuthFailure::Server(source),
            ..
        }) => assert!(matches!(
            source,
            groker_smtp::Error::ConnectionClosed | groker_smtp::Error::Io(_)
        )),
        other => panic!("expected an authentication fault, got {other:?}"),
    }
    assert_eq!(
        session.history(),
        [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::SecureIfRequested,
            SessionState::Closed,
        ]
    );

    let errors = texts(reporter.sink(), Severity::Error);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "Authentication failed for user 'ops'");
    assert!(errors.iter().all(|t| !t.contains("closing")));

    server.await.unwrap();
}

#[tokio::test]
async fn test_implicit_ssl_delivers() {
    let cert = TestCert::new();
    let (port, server) = serve_with(
        vec![
            (HANDSHAKE, ""),
            ("", GREETING),
            ("EHLO", "250-mx.test\r\n250 AUTH PLAIN\r\n"),
            ("AUTH PLAIN", "235 2.7.0 Accepted\r\n"),
            ("MAIL FROM", "250 OK\r\n"),
            ("RCPT TO", "250 OK\r\n"),
            ("DATA", "354 go ahead\r\n"),
            (BODY, "250 queued\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
        Some(cert.acceptor.clone()),
    )
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session =
        Session::new(implicit_ssl(port), &reporter).with_tls_config(Arc::clone(&cert.client));
    let outcome = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["a@x.com"],
            false,
        ))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Sent { refused: vec![] });
    let sink = reporter.sink();
    assert!(sink.entries().iter().any(|e| e.text == "SSL Connection in use"));
    assert!(texts(sink, Severity::Warning).is_empty());

    let received = server.await.unwrap();
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_starttls_then_auth_over_tls() {
    let cert = TestCert::new();
    let (port, server) = serve_with(
        vec![
            ("", GREETING),
            ("EHLO", "250-mx.test\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "220 2.0.0 Ready to start TLS\r\n"),
            (HANDSHAKE, ""),
            ("EHLO", "250-mx.test\r\n250 AUTH PLAIN LOGIN\r\n"),
            ("AUTH PLAIN", "235 2.7.0 Accepted\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
        Some(cert.acceptor.clone()),
    )
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session =
        Session::new(starttls(port), &reporter).with_tls_config(Arc::clone(&cert.client));
    let outcome = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["a@x.com"],
            true,
        ))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::DryRun);
    assert_eq!(
        session.history(),
        [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::SecureIfRequested,
            SessionState::AuthenticatedIfRequired,
            SessionState::DryRun,
            SessionState::Closed,
        ]
    );
    let sink = reporter.sink();
    assert!(texts(sink, Severity::Warning).is_empty());
    assert!(sink.entries().iter().any(|e| e.text == "220 - 2.0.0 Ready to start TLS"));

    let received = server.await.unwrap();
    assert_eq!(received.iter().filter(|l| l.starts_with("EHLO")).count(), 2);
}

#[tokio::test]
async fn test_untrusted_starttls_certificate() {
    let cert = TestCert::new();
    let (port, server) = serve_with(
        vec![
            ("", GREETING),
            ("EHLO", "250-mx.test\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "220 2.0.0 Ready to start TLS\r\n"),
            (HANDSHAKE, ""),
        ],
        Some(cert.acceptor.clone()),
    )
    .await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(starttls(port), &reporter);
    let result = session
        .run(&attempt(
            Some(Credentials::new("ops", "secret")),
            &["a@x.com"],
            false,
        ))
        .await;

    assert!(matches!(
        result,
        Err(Fault::SecureUpgrade(groker_smtp::Error::Tls(_)))
    ));
    assert_eq!(
        session.history(),
        [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::Closed,
        ]
    );
    let errors = texts(reporter.sink(), Severity::Error);
    assert_eq!(errors[0], "STARTTLS negotiation failed");
    assert!(errors[1].starts_with("TLS error"));

    let received = server.await.unwrap();
    assert!(received.iter().all(|l| !l.starts_with("AUTH")));
}

#[tokio::test]
async fn test_untrusted_ssl_certificate() {
    let cert = TestCert::new();
    let (port, server) =
        serve_with(vec![(HANDSHAKE, ""), ("", GREETING)], Some(cert.acceptor.clone())).await;

    let reporter = Reporter::new(MemorySink::default());
    let mut session = Session::new(implicit_ssl(port), &reporter);
    let result = session.run(&attempt(None, &["a@x.com"], false)).await;

    match result {
        Err(Fault::Connection { source, .. }) => {
            assert!(matches!(source, groker_smtp::Error::Tls(_)));
        }
        other => panic!("expected a connection fault, got {other:?}"),
    }

    server.await.unwrap();
}

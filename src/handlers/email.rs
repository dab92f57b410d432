//! A handler that sends alerts as plain-text emails over SMTP.

use super::{test_message, Handler};
use crate::config::{self, Pair, Requirements};
use crate::error::{ConfigError, DeliveryError};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::{self, authentication::Credentials, SmtpTransportBuilder};
use lettre::{Address, Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::TcpStream;
use tracing::{debug, instrument, warn};

/// Subject line of every alert email.
pub const ALERT_SUBJECT: &str = "An update on your simulation";

/// Subject line of the connectivity check email.
pub const TEST_SUBJECT: &str = "Test email";

const ENV_PREFIX: &str = "SIMULERT_EMAIL_";

#[serde_as]
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct EmailSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<Pair>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<Pair>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<Pair>,
}

/// Delivers a fully built email.
///
/// [`LettreTransport`] is the real SMTP implementation; tests substitute
/// their own.
pub trait MailTransport: Send + Sync {
    fn send(&self, email: &Message) -> Result<(), DeliveryError>;
}

/// SMTP delivery through `lettre`.
///
/// Each send opens its own session, preferring implicit TLS. An
/// unauthenticated TLS check decides the mode: only a refused connection or a
/// failed TLS handshake falls back to an unencrypted connection. Sessions
/// are not pooled: each is closed once the send returns, whether or not it
/// succeeded.
pub struct LettreTransport {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl LettreTransport {
    /// `credentials` are only used when the username is non-empty.
    pub fn new(host: impl Into<String>, port: u16, credentials: &Pair) -> Self {
        let credentials = (!credentials.0.is_empty())
            .then(|| Credentials::new(credentials.0.clone(), credentials.1.clone()));
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    fn configure(&self, builder: SmtpTransportBuilder) -> SmtpTransport {
        let builder = builder.port(self.port);
        match &self.credentials {
            Some(credentials) => builder.credentials(credentials.clone()).build(),
            None => builder.build(),
        }
    }

    fn open_session(&self) -> Result<SmtpTransport, DeliveryError> {
        // The TLS check carries no credentials so they never leave unencrypted.
        let tls_check = SmtpTransport::relay(&self.host)?.port(self.port).build();
        match tls_check.test_connection() {
            Ok(_) => Ok(self.configure(SmtpTransport::relay(&self.host)?)),
            Err(e) if encryption_unavailable(&e) => {
                warn!(host = %self.host, error = %e, "Using a non TLS server connection.");
                Ok(self.configure(SmtpTransport::builder_dangerous(&self.host)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// True when the server refused the connection or could not complete a TLS
/// handshake. Resolution failures and timeouts do not qualify.
fn encryption_unavailable(err: &smtp::Error) -> bool {
    if err.is_tls() {
        return true;
    }
    let Some(cause) = StdError::source(err) else {
        return false;
    };
    if let Some(io_err) = cause.downcast_ref::<io::Error>() {
        return io_err.kind() == io::ErrorKind::ConnectionRefused;
    }
    cause.is::<native_tls::HandshakeError<TcpStream>>() || cause.is::<native_tls::Error>()
}

impl fmt::Debug for LettreTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LettreTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl MailTransport for LettreTransport {
    fn send(&self, email: &Message) -> Result<(), DeliveryError> {
        let session = self.open_session()?;
        session.send(email)?;
        Ok(())
    }
}

/// Builds an [`Emailer`].
///
/// Unset fields fall back to `SIMULERT_EMAIL_HOST`, `SIMULERT_EMAIL_PORT`,
/// `SIMULERT_EMAIL_AUTHENTICATION`, `SIMULERT_EMAIL_SENDER` and
/// `SIMULERT_EMAIL_RECIPIENT`. The pair-valued variables are comma
/// separated, e.g. `SIMULERT_EMAIL_SENDER="Lab bot, bot@example.com"`.
#[derive(Default)]
pub struct EmailerBuilder {
    settings: EmailSettings,
    transport: Option<Box<dyn MailTransport>>,
}

impl EmailerBuilder {
    /// The address of the mail server.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = Some(port);
        self
    }

    /// Username and password for the mail server. An empty username skips
    /// authentication.
    pub fn authentication(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.authentication = Some(Pair::new(username, password));
        self
    }

    pub fn sender(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.settings.sender = Some(Pair::new(name, address));
        self
    }

    pub fn recipient(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.settings.recipient = Some(Pair::new(name, address));
        self
    }

    /// Replaces the SMTP transport.
    pub fn transport(mut self, transport: impl MailTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn build(self) -> Result<Emailer, ConfigError> {
        let settings = config::resolve(ENV_PREFIX, &self.settings)?;

        let mut requirements = Requirements::new("Email", ENV_PREFIX);
        let authentication = requirements.require("authentication", settings.authentication);
        let sender = requirements.require("sender", settings.sender);
        let recipient = requirements.require("recipient", settings.recipient);
        let host = requirements.require_str("host", settings.host);
        let port = requirements.require("port", settings.port);

        let (Some(authentication), Some(sender), Some(recipient), Some(host), Some(port)) =
            (authentication, sender, recipient, host, port)
        else {
            return Err(requirements.into_error());
        };

        let sender = mailbox("sender", &sender)?;
        let recipient = mailbox("recipient", &recipient)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(LettreTransport::new(host.clone(), port, &authentication)),
        };

        Ok(Emailer {
            host,
            port,
            authentication,
            sender,
            recipient,
            transport,
        })
    }
}

fn mailbox(field: &'static str, pair: &Pair) -> Result<Mailbox, ConfigError> {
    let address: Address = pair.1.parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{:?} is not a valid email address: {e}", pair.1),
    })?;
    let name = (!pair.0.is_empty()).then(|| pair.0.clone());
    Ok(Mailbox::new(name, address))
}

/// An alert handler that sends emails.
pub struct Emailer {
    host: String,
    port: u16,
    authentication: Pair,
    sender: Mailbox,
    recipient: Mailbox,
    transport: Box<dyn MailTransport>,
}

impl Emailer {
    pub fn builder() -> EmailerBuilder {
        EmailerBuilder::default()
    }

    /// Builds a handler entirely from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn authentication(&self) -> &Pair {
        &self.authentication
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    pub fn recipient(&self) -> &Mailbox {
        &self.recipient
    }

    /// Sends an email with the given subject and plain-text body.
    #[instrument(skip(self, body), fields(to = %self.recipient))]
    pub fn send_email(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let email = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        self.transport.send(&email)?;
        debug!("Email delivered.");
        Ok(())
    }

    /// Sends a timestamped email with the subject "Test email".
    pub fn send_test_email(&self) -> Result<(), DeliveryError> {
        self.send_email(TEST_SUBJECT, &test_message("email"))
    }
}

impl fmt::Debug for Emailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emailer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .finish_non_exhaustive()
    }
}

impl Handler for Emailer {
    fn kind(&self) -> &str {
        "Email"
    }

    fn destination(&self) -> String {
        self.recipient.to_string()
    }

    fn send_message(&self, message: &str) -> Result<(), DeliveryError> {
        self.send_email(ALERT_SUBJECT, message)
    }

    fn send_test_message(&self) -> Result<(), DeliveryError> {
        self.send_test_email()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Captures sent emails instead of talking to a server.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<(String, Vec<String>, String)>>>,
        fail_with: Option<&'static str>,
    }

    impl RecordingTransport {
        fn failing(reason: &'static str) -> Self {
            Self {
                fail_with: Some(reason),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(String, Vec<String>, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MailTransport for RecordingTransport {
        fn send(&self, email: &Message) -> Result<(), DeliveryError> {
            if let Some(reason) = self.fail_with {
                return Err(DeliveryError::Transport(reason.to_string()));
            }
            let envelope = email.envelope();
            let from = envelope.from().map(ToString::to_string).unwrap_or_default();
            let to = envelope.to().iter().map(ToString::to_string).collect();
            let raw = String::from_utf8(email.formatted()).unwrap();
            self.sent.lock().unwrap().push((from, to, raw));
            Ok(())
        }
    }

    fn builder_with(transport: RecordingTransport) -> EmailerBuilder {
        Emailer::builder()
            .authentication("", "")
            .sender("see", "see@example.com")
            .recipient("soo", "soo@example.com")
            .host("localhost")
            .port(1025)
            .transport(transport)
    }

    #[test]
    fn builds_from_arguments() {
        let handler = Emailer::builder()
            .authentication("user", "key")
            .sender("see", "see@example.com")
            .recipient("soo", "soo@example.com")
            .host("hostus")
            .port(42)
            .build()
            .unwrap();

        assert_eq!(handler.authentication(), &Pair::new("user", "key"));
        assert_eq!(handler.sender().email.to_string(), "see@example.com");
        assert_eq!(handler.sender().name.as_deref(), Some("see"));
        assert_eq!(handler.recipient().email.to_string(), "soo@example.com");
        assert_eq!(handler.host(), "hostus");
        assert_eq!(handler.port(), 42);
    }

    #[test]
    fn builds_from_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("SIMULERT_EMAIL_AUTHENTICATION", "user, key");
            jail.set_env("SIMULERT_EMAIL_SENDER", "see,see@example.com");
            jail.set_env("SIMULERT_EMAIL_RECIPIENT", "soo,soo@example.com");
            jail.set_env("SIMULERT_EMAIL_HOST", "mostus");
            jail.set_env("SIMULERT_EMAIL_PORT", "42");

            let handler = Emailer::from_env().unwrap();
            assert_eq!(handler.authentication(), &Pair::new("user", "key"));
            assert_eq!(handler.sender().name.as_deref(), Some("see"));
            assert_eq!(handler.recipient().email.to_string(), "soo@example.com");
            assert_eq!(handler.host(), "mostus");
            assert_eq!(handler.port(), 42);
            Ok(())
        });
    }

    #[test]
    fn build_names_every_missing_field() {
        Jail::expect_with(|_| {
            let err = Emailer::builder().build().unwrap_err();
            assert_eq!(
                err.missing_fields(),
                vec!["authentication", "sender", "recipient", "host", "port"]
            );
            let message = err.to_string();
            for var in [
                "SIMULERT_EMAIL_AUTHENTICATION",
                "SIMULERT_EMAIL_SENDER",
                "SIMULERT_EMAIL_RECIPIENT",
                "SIMULERT_EMAIL_HOST",
                "SIMULERT_EMAIL_PORT",
            ] {
                assert!(message.contains(var), "{message} should mention {var}");
            }

            let err = Emailer::builder()
                .authentication("user", "key")
                .build()
                .unwrap_err();
            assert_eq!(err.missing_fields(), vec!["sender", "recipient", "host", "port"]);

            let err = Emailer::builder()
                .sender("foo", "foo@example.com")
                .build()
                .unwrap_err();
            assert_eq!(
                err.missing_fields(),
                vec!["authentication", "recipient", "host", "port"]
            );
            Ok(())
        });
    }

    #[test]
    fn build_rejects_invalid_address() {
        let err = builder_with(RecordingTransport::default())
            .recipient("soo", "rail")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "recipient", .. }));
    }

    #[test]
    fn send_email_builds_message() {
        let transport = RecordingTransport::default();
        builder_with(transport.clone())
            .build()
            .unwrap()
            .send_email("subject", "body")
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (from, to, raw) = &sent[0];
        assert_eq!(from, "see@example.com");
        assert_eq!(to, &vec!["soo@example.com".to_string()]);
        assert!(raw.contains("Subject: subject"));
        assert!(raw.trim_end().ends_with("body"));
    }

    #[test]
    fn alert_uses_update_subject() {
        let transport = RecordingTransport::default();
        builder_with(transport.clone()).build().unwrap().alert("a message");

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("Subject: An update on your simulation"));
        assert!(sent[0].2.trim_end().ends_with("a message"));
    }

    #[test]
    fn send_test_message_uses_test_subject() {
        let transport = RecordingTransport::default();
        builder_with(transport.clone())
            .build()
            .unwrap()
            .send_test_message()
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("Subject: Test email"));
        assert!(sent[0].2.contains("This test email was sent at"));
    }

    #[test]
    #[traced_test]
    fn alert_logs_failed_delivery() {
        builder_with(RecordingTransport::failing("valueerror"))
            .build()
            .unwrap()
            .alert("a message");

        assert!(logs_contain("Email notification to soo"));
        assert!(logs_contain("failed with transport error: valueerror"));
    }

    #[test]
    #[traced_test]
    fn unreachable_server_falls_back_and_is_contained() {
        // Grab a free port, then release it so connections are refused.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let handler = Emailer::builder()
            .authentication("", "")
            .sender("see", "see@example.com")
            .recipient("soo", "soo@example.com")
            .host("127.0.0.1")
            .port(port)
            .build()
            .unwrap();

        handler.alert("a message");

        assert!(logs_contain("Using a non TLS server connection."));
        assert!(logs_contain("Email notification to soo"));
    }

    /// A plaintext SMTP server that rejects every login. Each connection's
    /// transcript is sent back once the client hangs up.
    fn spawn_rejecting_server(connections: usize) -> (u16, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                let Ok(stream) = stream else { break };
                if tx.send(serve_session(stream)).is_err() {
                    break;
                }
            }
        });
        (port, rx)
    }

    fn serve_session(stream: TcpStream) -> String {
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut transcript = String::new();
        let _ = writer.write_all(b"220 localhost ESMTP\r\n");

        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let command = String::from_utf8_lossy(&line).to_ascii_uppercase();
            transcript.push_str(&command);

            let reply: &[u8] = if command.starts_with("EHLO") {
                b"250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if command.starts_with("AUTH") {
                b"535 5.7.8 Authentication credentials invalid\r\n"
            } else if command.starts_with("QUIT") {
                let _ = writer.write_all(b"221 Bye\r\n");
                break;
            } else {
                b"250 OK\r\n"
            };
            if writer.write_all(reply).is_err() {
                break;
            }
        }
        transcript
    }

    fn alert_email() -> Message {
        Message::builder()
            .from("see@example.com".parse().unwrap())
            .to("soo@example.com".parse().unwrap())
            .subject(ALERT_SUBJECT)
            .body("a message".to_string())
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn rejected_login_is_reported_without_retrying() {
        let (port, transcripts) = spawn_rejecting_server(2);
        let transport = LettreTransport::new("127.0.0.1", port, &Pair::new("user", "wrong"));

        let err = transport.send(&alert_email()).unwrap_err();

        assert!(matches!(&err, DeliveryError::Smtp(e) if e.is_permanent()), "{err}");
        let handshake = transcripts.recv_timeout(Duration::from_secs(10)).unwrap();
        let plaintext = transcripts.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(!handshake.contains("AUTH"));
        assert!(plaintext.starts_with("EHLO"));
        assert!(plaintext.contains("AUTH PLAIN"));
        assert!(!plaintext.contains("MAIL FROM"));
        // Only the failed handshake triggers a fallback; the rejection does not.
        assert!(logs_contain("Using a non TLS server connection."));
        assert!(transcripts.recv_timeout(Duration::from_millis(200)).is_err());
    }
}

//! SmtpNotifier - lettre の非同期 SMTP transport による Notifier
//!
//! relay は平文・認証なし（Mailhog）。`MAIL_USER` / `MAIL_PASS` は読み込むが、
//! `mail.authenticate = true` を明示しない限り transport には渡さない。

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use crate::config::MailConfig;
use crate::domain::{DeliveryError, OutgoingMail};
use crate::ports::Notifier;

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Self {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port);
        if let Some(credentials) = credentials(config) {
            builder = builder.credentials(credentials);
        }
        Self {
            transport: builder.build(),
        }
    }
}

/// Credentials for the relay login; `None` unless `authenticate` is set.
fn credentials(config: &MailConfig) -> Option<Credentials> {
    if !config.authenticate {
        return None;
    }
    match (&config.username, &config.password) {
        (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
        _ => {
            warn!("mail.authenticate is set but MAIL_USER / MAIL_PASS are missing");
            None
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the RFC 5322 message for `mail`.
pub fn compose(mail: &OutgoingMail) -> Result<Message, DeliveryError> {
    Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| DeliveryError::Compose(e.to_string()))
}

fn classify(err: lettre::transport::smtp::Error) -> DeliveryError {
    // 4xx/5xx はリレーの拒否、それ以外は経路の問題
    if err.is_permanent() || err.is_transient() {
        DeliveryError::Rejected(err.to_string())
    } else {
        DeliveryError::Transport(err.to_string())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let message = compose(mail)?;
        let response = self.transport.send(message).await.map_err(classify)?;
        debug!(to = %mail.to, code = %response.code(), "relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from: "noreply@example.com".into(),
            to: to.into(),
            subject: "Data available in the database: Test 1".into(),
            body: "This is test message 1".into(),
        }
    }

    #[test]
    fn compose_sets_headers() {
        let message = compose(&mail("test1@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: noreply@example.com"));
        assert!(raw.contains("To: test1@example.com"));
        assert!(raw.contains("Subject: Data available in the database: Test 1"));
        assert!(raw.contains("This is test message 1"));
    }

    #[test]
    fn compose_rejects_invalid_recipient() {
        let err = compose(&mail("not an address")).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { address, .. } if address == "not an address"));
    }

    #[tokio::test]
    async fn invalid_address_fails_before_connecting() {
        let notifier = SmtpNotifier::new(&MailConfig::default());
        let err = notifier.send(&mail("broken")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }

    fn mail_config(port: u16, username: Option<&str>, password: Option<&str>) -> MailConfig {
        MailConfig {
            host: "127.0.0.1".into(),
            port,
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..MailConfig::default()
        }
    }

    #[rstest]
    #[case::no_opt_in(false, Some("user"), Some("pass"), false)]
    #[case::opt_in(true, Some("user"), Some("pass"), true)]
    #[case::opt_in_missing_password(true, Some("user"), None, false)]
    #[case::nothing_set(false, None, None, false)]
    fn credentials_need_explicit_opt_in(
        #[case] authenticate: bool,
        #[case] username: Option<&str>,
        #[case] password: Option<&str>,
        #[case] expected: bool,
    ) {
        let config = MailConfig {
            authenticate,
            ..mail_config(1025, username, password)
        };
        assert_eq!(credentials(&config).is_some(), expected);
    }

    /// Minimal relay that advertises no AUTH mechanism and records the verbs it sees.
    async fn unauthenticated_relay() -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let verbs = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&verbs);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 relay ready\r\n").await.unwrap();

            let mut in_data = false;
            while let Ok(Some(line)) = lines.next_line().await {
                if in_data {
                    if line == "." {
                        in_data = false;
                        write.write_all(b"250 queued\r\n").await.unwrap();
                    }
                    continue;
                }
                let verb = line
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_ascii_uppercase();
                seen.lock().unwrap().push(verb.clone());
                let reply: &[u8] = match verb.as_str() {
                    "EHLO" => b"250-relay\r\n250 8BITMIME\r\n",
                    "DATA" => {
                        in_data = true;
                        b"354 end with <CRLF>.<CRLF>\r\n"
                    }
                    "QUIT" => b"221 bye\r\n",
                    "AUTH" => b"504 unrecognized authentication type\r\n",
                    _ => b"250 ok\r\n",
                };
                write.write_all(reply).await.unwrap();
                if verb == "QUIT" {
                    break;
                }
            }
        });

        (port, verbs)
    }

    #[tokio::test]
    async fn env_credentials_do_not_change_send_path() {
        let (port, verbs) = unauthenticated_relay().await;
        let mut config = crate::config::Config::default();
        config
            .apply_env_with(|key| match key {
                "MAIL_HOST" => Some("127.0.0.1".to_string()),
                "MAIL_PORT" => Some(port.to_string()),
                "MAIL_USER" => Some("user".to_string()),
                "MAIL_PASS" => Some("pass".to_string()),
                _ => None,
            })
            .unwrap();

        let notifier = SmtpNotifier::new(&config.mail);
        notifier.send(&mail("test1@example.com")).await.unwrap();

        let verbs = verbs.lock().unwrap().clone();
        assert!(verbs.iter().any(|v| v == "DATA"));
        assert!(!verbs.iter().any(|v| v == "AUTH"));
    }
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::sleep,
};

use crate::{actor::ActorRef, actor::Rto, settings::SmtpSettings};

/// A single outgoing email
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Send `body` as HTML instead of plain text
    pub html: bool,
}

/// Delivers emails, one at a time
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Mailer backed by an authenticated SMTP relay using implicit TLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .port(settings.port.unwrap_or(465))
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(SmtpMailer { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let content_type = if email.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = Message::builder()
            .from(email.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject.clone())
            .header(content_type)
            .body(email.body.clone())?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Mailer used when no SMTP relay is configured. Emails are only logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        log::info!("Not sending '{}' to {}, SMTP is disabled", email.subject, email.to);
        log::debug!("{}", email.body);
        Ok(())
    }
}

/// Outcome of a batch send
#[derive(PartialEq, Eq, Debug, Default, Clone, Copy, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Requests for MailActor
pub enum MailRequest {
    Send(Email, Rto<()>),
    SendBatch(Vec<Email>, Rto<DispatchReport>),
}

pub type MailActor = ActorRef<MailRequest>;

/// Send `emails` one after another, pausing `delay` between two sends.
///
/// A failed email is logged and counted, the rest of the batch still goes out.
pub async fn send_batch(mailer: &dyn Mailer, emails: Vec<Email>, delay: Duration) -> DispatchReport {
    let mut report = DispatchReport::default();

    for (i, email) in emails.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            sleep(delay).await;
        }

        match mailer.send(email).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                log::error!("Error sending '{}' to {}: {}", email.subject, email.to, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Runs batches one after another, each rate limited by `delay`.
async fn run_batch_worker(
    mailer: Arc<dyn Mailer>,
    delay: Duration,
    mut rx: UnboundedReceiver<(Vec<Email>, Rto<DispatchReport>)>,
) {
    while let Some((emails, rto)) = rx.recv().await {
        log::info!("Sending batch of {} emails", emails.len());
        let report = send_batch(mailer.as_ref(), emails, delay).await;
        log::info!("Batch done, {} sent, {} failed", report.sent, report.failed);
        rto.reply(Ok(report))
    }
}

/// Sends single emails as they come and hands batches to a worker, so a long batch
/// never holds back a confirmation or contact email.
pub async fn run_mail_actor(
    mailer: Arc<dyn Mailer>,
    delay: Duration,
    mut rx: UnboundedReceiver<MailRequest>,
) -> anyhow::Result<()> {
    let (batch_tx, batch_rx) = mpsc::unbounded_channel();
    let batch_worker = tokio::spawn(run_batch_worker(mailer.clone(), delay, batch_rx));

    while let Some(msg) = rx.recv().await {
        match msg {
            MailRequest::Send(email, rto) => {
                let result = mailer.send(&email).await;
                if let Err(e) = &result {
                    log::error!("Error sending '{}' to {}: {}", email.subject, email.to, e);
                }
                rto.reply(result)
            }
            MailRequest::SendBatch(emails, rto) => {
                if let Err(mpsc::error::SendError((_, rto))) = batch_tx.send((emails, rto)) {
                    rto.reply(Err(anyhow::anyhow!("Batch worker is no longer running")));
                }
            }
        }
    }

    drop(batch_tx);
    batch_worker.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{send_message, testing::RecordingMailer};

    fn email(to: &str) -> Email {
        Email {
            from: "matches@example.org".to_owned(),
            to: to.to_owned(),
            subject: "Hello".to_owned(),
            body: "Hi".to_owned(),
            html: false,
        }
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let mailer = RecordingMailer::failing_for("bad@example.org");
        let emails = vec![
            email("a@example.org"),
            email("bad@example.org"),
            email("b@example.org"),
        ];

        let report = send_batch(&mailer, emails, Duration::ZERO).await;
        assert_eq!(report, DispatchReport { sent: 2, failed: 1 });
        assert_eq!(mailer.recipients(), vec!["a@example.org", "b@example.org"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_is_rate_limited() {
        let mailer = RecordingMailer::default();
        let started = tokio::time::Instant::now();

        send_batch(
            &mailer,
            vec![email("a@example.org"), email("b@example.org"), email("c@example.org")],
            Duration::from_secs(5),
        )
        .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_single_send_skips_batch_queue() {
        let mailer = Arc::new(RecordingMailer::default());
        let (actor, rx) = MailActor::new();
        tokio::spawn(run_mail_actor(mailer.clone(), Duration::from_secs(1), rx));

        let batch_actor = actor.clone();
        let batch = tokio::spawn(async move {
            let emails: Vec<Email> = (0..4).map(|i| email(&format!("{}@example.org", i))).collect();
            send_message!(batch_actor, MailRequest, SendBatch, emails)
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = tokio::time::Instant::now();
        send_message!(actor, MailRequest, Send, email("contact@example.org")).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!batch.is_finished());

        let report = batch.await.unwrap().unwrap();
        assert_eq!(report.sent, 4);
        assert_eq!(mailer.recipients().len(), 5);
    }

    #[tokio::test]
    async fn test_actor_replies() {
        let mailer = Arc::new(RecordingMailer::failing_for("bad@example.org"));
        let (actor, rx) = MailActor::new();
        tokio::spawn(run_mail_actor(mailer.clone(), Duration::ZERO, rx));

        assert!(send_message!(actor, MailRequest, Send, email("a@example.org")).is_ok());
        assert!(send_message!(actor, MailRequest, Send, email("bad@example.org")).is_err());

        let report = send_message!(
            actor,
            MailRequest,
            SendBatch,
            vec![email("b@example.org"), email("c@example.org")]
        )
        .unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(mailer.recipients().len(), 3);
    }
}

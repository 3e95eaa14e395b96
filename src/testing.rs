//! In-memory stand-ins for the ticketing source and the mail relay.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    core::{db::EventDb, event::Event, roster::Registrant, service::EventService},
    integrations::{
        eventbrite::TicketSource,
        mail::{run_mail_actor, Email, MailActor, Mailer},
    },
    settings::{AdminSettings, EventbriteSettings, MailSettings, Settings},
};

pub fn test_settings() -> Settings {
    Settings {
        database: ":memory:".to_owned(),
        web_port: None,
        client_origin: None,
        eventbrite: EventbriteSettings {
            token: "token".to_owned(),
            organization: "42".to_owned(),
            base_url: None,
            ticket_classes: None,
        },
        smtp: None,
        mail: MailSettings {
            matches_address: "matches@example.org".to_owned(),
            contact_address: "contact@example.org".to_owned(),
            organization_name: "Sparks".to_owned(),
            website_url: "https://example.org".to_owned(),
        },
        admin: AdminSettings {
            first_name: "Ada".to_owned(),
            last_name: "Admin".to_owned(),
            email: "ada@example.org".to_owned(),
            password: "hunter2".to_owned(),
        },
        send_delay_secs: Some(0),
        scheduler_poll_secs: None,
        revisit_policy: None,
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: Option<String>,
}

impl RecordingMailer {
    pub fn failing_for(recipient: &str) -> Self {
        RecordingMailer {
            sent: Mutex::default(),
            failing: Some(recipient.to_owned()),
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|e| e.to).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.failing.as_deref() == Some(email.to.as_str()) {
            return Err(anyhow::anyhow!("Mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTicketSource {
    pub events: Mutex<Vec<Event>>,
    pub attendees: Mutex<Vec<Registrant>>,
    pub offline: Mutex<bool>,
}

impl FakeTicketSource {
    pub fn new(events: Vec<Event>, attendees: Vec<Registrant>) -> Self {
        FakeTicketSource {
            events: Mutex::new(events),
            attendees: Mutex::new(attendees),
            offline: Mutex::new(false),
        }
    }

    fn check_online(&self) -> anyhow::Result<()> {
        if *self.offline.lock().unwrap() {
            Err(anyhow::anyhow!("Ticketing source is unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TicketSource for FakeTicketSource {
    async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
        self.check_online()?;
        Ok(self.events.lock().unwrap().clone())
    }

    async fn list_attendees(&self, _event_id: &str) -> anyhow::Result<Vec<Registrant>> {
        self.check_online()?;
        Ok(self.attendees.lock().unwrap().clone())
    }
}

/// Service over an in-memory store, mailing through an unthrottled actor.
pub async fn test_service(tickets: Arc<FakeTicketSource>) -> (EventService, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());
    let (mail, rx) = MailActor::new();
    tokio::spawn(run_mail_actor(mailer.clone(), Duration::ZERO, rx));

    let service = EventService::new(
        Arc::new(EventDb::in_memory().await.unwrap()),
        tickets,
        mail,
        Arc::new(test_settings()),
    );
    (service, mailer)
}

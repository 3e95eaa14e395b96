use std::sync::Arc;

use tokio::task::JoinSet;

use crate::settings::Settings;

use self::{
    eventbrite::{EventbriteClient, TicketSource},
    mail::{run_mail_actor, LogMailer, MailActor, Mailer, SmtpMailer},
};

pub mod eventbrite;
pub mod mail;

/// Connect to the ticketing source and start the mail actor.
pub fn init_integrations(
    tasks: &mut JoinSet<Result<(), anyhow::Error>>,
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn TicketSource>, MailActor)> {
    let tickets = EventbriteClient::new(&settings.eventbrite, settings.ticket_classes())?;

    let mailer: Arc<dyn Mailer> = match &settings.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            log::warn!("No SMTP relay configured, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let (mail_actor, rx) = MailActor::new();
    tasks.spawn(run_mail_actor(mailer, settings.send_delay(), rx));

    Ok((Arc::new(tickets), mail_actor))
}

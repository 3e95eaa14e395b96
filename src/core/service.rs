use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    error::{QueryError, QueryResult, UpstreamContext},
    integrations::{
        eventbrite::TicketSource,
        mail::{DispatchReport, Email, MailActor, MailRequest},
    },
    send_message,
    settings::Settings,
    util::{capitalize_name, normalize_string},
};

use super::{
    attendee::{
        make_public_attendees, opposite_pool, public_name, Attendee, Gender, Identity,
        PublicAttendee, Submission,
    },
    db::{EventDb, NotificationKind},
    emails,
    event::Event,
    interest::{check_selectable, parse_interests, resolve, RawInterest},
    roster::{reconcile, Registrant},
};

/// What a caller gets back when fetching an event roster
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RosterView {
    /// Authenticated admin: the list as shown to attendees, and every record
    Admin {
        public_attendees: Vec<PublicAttendee>,
        admin_attendees: Vec<Attendee>,
    },
    /// Admin identity entered on the attendee form
    Full { attendees: Vec<Attendee> },
    /// An attendee sees who they may select
    Attendee {
        attendees: Vec<PublicAttendee>,
        #[serde(rename = "previousInfo", skip_serializing_if = "Option::is_none")]
        previous_info: Option<PreviousInfo>,
    },
}

/// Answers of an earlier submission, used to prefill the form
#[derive(PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousInfo {
    pub notes: String,
    pub feedback: String,
    pub cell_phone: String,
    pub interests: Vec<i64>,
    pub referral_info: String,
    pub website_feedback: String,
    pub send_contact_to_non_mutual: bool,
}

impl From<&Attendee> for PreviousInfo {
    fn from(attendee: &Attendee) -> Self {
        PreviousInfo {
            notes: attendee.notes.clone().unwrap_or_default(),
            feedback: attendee.feedback.clone().unwrap_or_default(),
            cell_phone: attendee.cell_phone.clone().unwrap_or_default(),
            interests: attendee.interests.ids().to_vec(),
            referral_info: attendee.referral_info.clone().unwrap_or_default(),
            website_feedback: attendee.website_feedback.clone().unwrap_or_default(),
            send_contact_to_non_mutual: attendee.shares_contact(),
        }
    }
}

/// A match form as posted by an attendee
#[derive(Debug, Clone)]
pub struct MatchForm {
    pub event_id: String,
    pub identity: Identity,
    pub interests: Vec<RawInterest>,
    pub notes: Option<String>,
    pub feedback: Option<String>,
    pub referral_info: Option<String>,
    pub cell_phone: Option<String>,
    pub website_feedback: Option<String>,
    pub send_contact_to_non_mutual: bool,
}

/// Normalize names and email the way ticketing records are normalized.
pub fn normalize_identity(identity: Identity) -> Identity {
    Identity {
        first_name: capitalize_name(&identity.first_name),
        last_name: capitalize_name(&identity.last_name),
        email: normalize_string(&identity.email),
    }
}

pub struct EventService {
    db: Arc<EventDb>,
    tickets: Arc<dyn TicketSource>,
    mail: MailActor,
    settings: Arc<Settings>,
}

impl EventService {
    pub fn new(
        db: Arc<EventDb>,
        tickets: Arc<dyn TicketSource>,
        mail: MailActor,
        settings: Arc<Settings>,
    ) -> Self {
        EventService {
            db,
            tickets,
            mail,
            settings,
        }
    }

    pub fn db(&self) -> &EventDb {
        &self.db
    }

    fn is_admin_identity(&self, identity: &Identity) -> bool {
        let admin = &self.settings.admin;
        identity.first_name == admin.first_name
            && identity.last_name == admin.last_name
            && identity.email == normalize_string(&admin.email)
    }

    /// Check admin credentials.
    pub fn authenticate(&self, username: &str, password: &str) -> QueryResult<()> {
        let admin = &self.settings.admin;
        if normalize_string(username) == normalize_string(&admin.email) && password == admin.password
        {
            Ok(())
        } else {
            log::warn!("Rejected admin login for {}", username);
            Err(QueryError::invalid("Incorrect username or password."))
        }
    }

    pub async fn all_events(&self) -> QueryResult<Vec<Event>> {
        self.tickets
            .list_events()
            .await
            .upstream("Error fetching events from Eventbrite.")
    }

    /// Events whose match form currently accepts submissions.
    pub async fn open_events(&self, now: OffsetDateTime) -> QueryResult<Vec<Event>> {
        let mut events = self.all_events().await?;
        events.retain(|e| e.is_open_for_submissions(now));
        Ok(events)
    }

    pub async fn find_event(&self, event_id: &str) -> QueryResult<Event> {
        self.all_events()
            .await?
            .into_iter()
            .find(|e| e.id == event_id)
            .ok_or_else(|| QueryError::invalid("Event not found."))
    }

    async fn fetch_registrants(&self, event_id: &str) -> QueryResult<Vec<Registrant>> {
        self.tickets
            .list_attendees(event_id)
            .await
            .upstream("Error fetching participants from Eventbrite.")
    }

    /// Merge `external` into the stored roster and persist new arrivals.
    async fn reconcile_with(
        &self,
        event_id: &str,
        external: &[Registrant],
    ) -> QueryResult<Vec<Attendee>> {
        let persisted = self
            .db
            .get_attendees(event_id)
            .await
            .upstream("Error fetching participants from database.")?;

        let initializing = persisted.is_empty();
        let result = reconcile(external, persisted);
        if !result.new_arrivals.is_empty() {
            if initializing {
                log::info!(
                    "Initializing roster of event {} with {} attendees",
                    event_id,
                    result.new_arrivals.len()
                );
            } else {
                log::info!(
                    "Adding {} new attendees to event {}",
                    result.new_arrivals.len(),
                    event_id
                );
            }

            self.db
                .add_attendees(event_id, &result.new_arrivals)
                .await
                .upstream("Error adding participants to database.")?;
        }

        Ok(result.roster)
    }

    /// Sync the roster of an event with the ticketing source and return it.
    pub async fn reconcile_roster(&self, event_id: &str) -> QueryResult<Vec<Attendee>> {
        let external = self.fetch_registrants(event_id).await?;
        self.reconcile_with(event_id, &external).await
    }

    /// Roster for the admin dashboard.
    pub async fn admin_roster(&self, event_id: &str) -> QueryResult<RosterView> {
        let roster = self.reconcile_roster(event_id).await?;
        Ok(RosterView::Admin {
            public_attendees: make_public_attendees(&roster, Gender::Male),
            admin_attendees: roster,
        })
    }

    /// Roster as seen by the person filling in the form.
    ///
    /// Attendees must be registered for the event. Resolving successfully marks them as
    /// in attendance, without waiting for the update.
    pub async fn attendee_roster(&self, event_id: &str, identity: Identity) -> QueryResult<RosterView> {
        let identity = normalize_identity(identity);
        let is_admin = self.is_admin_identity(&identity);

        let external = self.fetch_registrants(event_id).await?;
        if !is_admin
            && !external
                .iter()
                .any(|r| identity.is(&r.first_name, &r.last_name, &r.email))
        {
            return Err(QueryError::invalid("Participant is not present in Eventbrite."));
        }

        let roster = self.reconcile_with(event_id, &external).await?;
        if is_admin {
            return Ok(RosterView::Full { attendees: roster });
        }

        let me = roster
            .iter()
            .find(|a| a.email == identity.email)
            .ok_or_else(|| QueryError::invalid("Participant not found in the database."))?;

        let db = self.db.clone();
        let (event, email) = (event_id.to_owned(), identity.email.clone());
        tokio::spawn(async move {
            if let Err(e) = db.mark_attendance(&event, &email).await {
                log::error!("Error updating attendance of {} for event {}: {}", email, event, e);
            }
        });

        Ok(RosterView::Attendee {
            attendees: make_public_attendees(&roster, me.gender),
            previous_info: me.interests.is_submitted().then(|| PreviousInfo::from(me)),
        })
    }

    /// Validate and store a match form, then email a copy to the attendee.
    pub async fn submit_match_form(&self, form: MatchForm, now: OffsetDateTime) -> QueryResult<()> {
        let interests = parse_interests(&form.interests)?;
        let identity = normalize_identity(form.identity);

        let open = self.open_events(now).await?;
        if !open.iter().any(|e| e.id == form.event_id) {
            return Err(QueryError::invalid("Submissions for this event are now closed."));
        }

        let roster = self
            .db
            .get_attendees(&form.event_id)
            .await
            .upstream("Error fetching participants from database.")?;
        let me = roster
            .iter()
            .find(|a| identity.is(&a.first_name, &a.last_name, &a.email))
            .ok_or_else(|| QueryError::invalid("Participant not found in the database."))?;
        check_selectable(&interests, me, &roster)?;

        let submission = Submission {
            interests,
            feedback: form.feedback,
            referral_info: form.referral_info,
            website_feedback: form.website_feedback,
            notes: form.notes,
            cell_phone: form.cell_phone,
            send_contact_to_non_mutual: form.send_contact_to_non_mutual,
        };
        self.db
            .save_submission(&form.event_id, &me.email, &submission)
            .await
            .upstream("Error adding match form submission to database.")?;

        let pool = opposite_pool(&roster, me.gender);
        let selected: Vec<PublicAttendee> = pool
            .iter()
            .filter(|a| submission.interests.contains(&a.id))
            .map(|a| PublicAttendee {
                name: public_name(a, &pool),
                id: a.id,
            })
            .collect();

        let email = emails::confirmation(
            &self.settings.mail,
            me,
            submission.notes.as_deref(),
            &selected,
        );
        self.send_in_background(email);
        Ok(())
    }

    /// Queue an email whose failure only gets logged.
    fn send_in_background(&self, email: Email) {
        let mail = self.mail.clone();
        tokio::spawn(async move {
            let to = email.to.clone();
            if let Err(e) = send_message!(mail, MailRequest, Send, email) {
                log::warn!("Confirmation email to {} was not sent: {}", to, e);
            }
        });
    }

    async fn send_batch(&self, emails: Vec<Email>) -> QueryResult<DispatchReport> {
        send_message!(self.mail, MailRequest, SendBatch, emails).map_err(|e| {
            log::error!("Mail actor unavailable: {}", e);
            QueryError::delivery("Error sending emails.")
        })
    }

    /// Claim a notification, or return false if it was already sent for this event.
    async fn claim(&self, event_id: &str, kind: NotificationKind) -> QueryResult<bool> {
        let claimed = self
            .db
            .claim_notification(event_id, kind)
            .await
            .upstream("Error checking sent notifications.")?;
        if !claimed {
            log::info!("{} emails were already sent for event {}", kind.as_str(), event_id);
        }
        Ok(claimed)
    }

    async fn release(&self, event_id: &str, kind: NotificationKind) {
        if let Err(e) = self.db.release_notification(event_id, kind).await {
            log::error!("Failed to release {} claim for event {}: {}", kind.as_str(), event_id, e);
        }
    }

    /// Compute matches for an event and email every attendee who came, plus the
    /// feedback summary for the organizers. Runs at most once per event.
    pub async fn send_results(&self, event: &Event) -> QueryResult<DispatchReport> {
        if !self.claim(&event.id, NotificationKind::Results).await? {
            return Ok(DispatchReport::default());
        }

        let roster = self
            .db
            .get_attendees(&event.id)
            .await
            .upstream("Error fetching participants from database.");
        let roster = match roster {
            Ok(roster) => roster,
            Err(e) => {
                self.release(&event.id, NotificationKind::Results).await;
                return Err(e);
            }
        };

        log::info!("Starting emailer for event {}", event.id);
        let resolution = resolve(&roster);
        let policy = self.settings.revisit_policy.unwrap_or_default();
        let label = event.date_label();

        let mut batch: Vec<Email> = roster
            .iter()
            .filter(|a| {
                if !a.in_attendance {
                    log::debug!("{} {} was not in attendance", a.gender, a.id);
                }
                a.in_attendance && a.gender.opposite().is_some()
            })
            .map(|a| {
                emails::results(
                    &self.settings.mail,
                    a,
                    resolution.matches_for(a),
                    resolution.revisits_for(a),
                    policy,
                    &label,
                )
            })
            .collect();
        batch.push(emails::feedback_summary(&self.settings.mail, &roster, &label));

        self.send_batch(batch).await
    }

    /// Results for an event looked up by ID.
    pub async fn send_results_for(&self, event_id: &str) -> QueryResult<DispatchReport> {
        let event = self.find_event(event_id).await?;
        self.send_results(&event).await
    }

    /// Remind attendees who came but never submitted. Runs at most once per event.
    pub async fn send_reminders(&self, event_id: &str) -> QueryResult<DispatchReport> {
        if !self.claim(event_id, NotificationKind::Reminder).await? {
            return Ok(DispatchReport::default());
        }

        let attendees = self
            .db
            .get_attendees_to_remind(event_id)
            .await
            .upstream("Error fetching participants from database.");
        let attendees = match attendees {
            Ok(attendees) => attendees,
            Err(e) => {
                self.release(event_id, NotificationKind::Reminder).await;
                return Err(e);
            }
        };

        log::info!("Sending {} reminders for event {}", attendees.len(), event_id);
        let batch = attendees
            .iter()
            .map(|a| emails::reminder(&self.settings.mail, a))
            .collect();
        self.send_batch(batch).await
    }

    /// Forward a contact form query to the organizers.
    pub async fn contact(&self, name: &str, email: &str, message: &str) -> QueryResult<()> {
        let query = emails::contact_query(
            &self.settings.mail,
            name,
            &normalize_string(email),
            message,
        );
        send_message!(self.mail, MailRequest, Send, query)
            .map_err(|_| QueryError::delivery("Error submitting contact query."))
    }
}

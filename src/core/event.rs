use serde::Serialize;
use time::{macros::time, Duration, OffsetDateTime};

use crate::util::serialize_datetime;

/// Forms open this long before the event starts
const FORM_OPENS_BEFORE: Duration = Duration::hours(8);

/// A ticketed event, identified by the ticketing source's ID
#[derive(PartialEq, Eq, Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub name: String,

    /// Start time in the venue's local time, as displayed on the site
    #[serde(rename = "start")]
    pub start_local: String,

    #[serde(serialize_with = "serialize_datetime")]
    pub starts_at: OffsetDateTime,

    #[serde(serialize_with = "serialize_datetime")]
    pub ends_at: OffsetDateTime,
}

impl Event {
    /// 12:55 UTC on the day after the event started.
    pub fn form_deadline(&self) -> OffsetDateTime {
        self.next_day_at(time!(12:55))
    }

    /// Results go out right after the form deadline.
    pub fn results_due_at(&self) -> OffsetDateTime {
        self.next_day_at(time!(13:00))
    }

    /// Late submitters are reminded an hour after the event ends.
    pub fn reminder_due_at(&self) -> OffsetDateTime {
        self.ends_at + Duration::hours(1)
    }

    fn next_day_at(&self, at: time::Time) -> OffsetDateTime {
        let start = self.starts_at.to_offset(time::UtcOffset::UTC);
        (start.date() + Duration::days(1)).with_time(at).assume_utc()
    }

    /// Whether the match form accepts submissions at `now`.
    pub fn is_open_for_submissions(&self, now: OffsetDateTime) -> bool {
        now >= self.starts_at - FORM_OPENS_BEFORE && now < self.form_deadline()
    }

    /// Whether the event ended after `since` and no later than `now`.
    pub fn ended_between(&self, since: OffsetDateTime, now: OffsetDateTime) -> bool {
        self.ends_at > since && self.ends_at <= now
    }

    /// Short `month/day` label of the event date, used in email subjects.
    pub fn date_label(&self) -> String {
        let end = self.ends_at.to_offset(time::UtcOffset::UTC);
        format!("{}/{}", u8::from(end.month()), end.day())
    }
}

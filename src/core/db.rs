use sqlx::{
    migrate::MigrateDatabase, prelude::FromRow, sqlite::Sqlite, sqlite::SqlitePoolOptions,
    SqlitePool,
};
use time::OffsetDateTime;

use crate::scheduler::{Job, JobKind};

use super::attendee::{Attendee, Interests, Submission};

/// Notification batches that are sent at most once per event
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NotificationKind {
    Reminder,
    Results,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Results => "results",
        }
    }
}

/// Raw `event_attendees` row
#[derive(FromRow)]
struct AttendeeRow {
    attendee_id: i64,
    first_name: String,
    last_name: String,
    email: String,
    gender: String,
    in_attendance: bool,
    interests: Option<String>,
    feedback: Option<String>,
    referral_info: Option<String>,
    website_feedback: Option<String>,
    notes: Option<String>,
    cell_phone: Option<String>,
    send_contact_to_non_mutual: Option<bool>,
}

impl TryFrom<AttendeeRow> for Attendee {
    type Error = anyhow::Error;

    fn try_from(row: AttendeeRow) -> Result<Self, Self::Error> {
        Ok(Attendee {
            id: row.attendee_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            gender: row.gender.parse()?,
            in_attendance: row.in_attendance,
            interests: Interests::from_column(row.interests.as_deref()),
            feedback: row.feedback,
            referral_info: row.referral_info,
            website_feedback: row.website_feedback,
            notes: row.notes,
            cell_phone: row.cell_phone,
            send_contact_to_non_mutual: row.send_contact_to_non_mutual,
        })
    }
}

#[derive(FromRow)]
struct JobRow {
    job_key: String,
    kind: String,
    event_id: String,
    due_at: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            key: row.job_key,
            kind: row.kind.parse::<JobKind>()?,
            event_id: row.event_id,
            due_at: OffsetDateTime::from_unix_timestamp(row.due_at)?,
        })
    }
}

pub struct EventDb {
    db: SqlitePool,
}

impl EventDb {
    /// Open the database file, creating it and its tables when missing.
    pub async fn connect(file: &str) -> anyhow::Result<Self> {
        let url = format!("sqlite://{}", file);
        if !Sqlite::database_exists(&url).await? {
            log::info!("Creating database {}", file);
            Sqlite::create_database(&url).await?;
        }

        let db = SqlitePool::connect(&url).await?;
        let event_db = EventDb { db };
        event_db.create_tables().await?;
        Ok(event_db)
    }

    /// Private database living as long as the returned value.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let event_db = EventDb { db };
        event_db.create_tables().await?;
        Ok(event_db)
    }

    async fn create_tables(&self) -> anyhow::Result<()> {
        sqlx::query(
            "create table if not exists event_attendees(
                        event_id text not null,
                        email text not null,
                        attendee_id integer not null,
                        first_name text not null,
                        last_name text not null,
                        gender text not null,
                        in_attendance boolean not null default false,
                        interests text,
                        feedback text,
                        referral_info text,
                        website_feedback text,
                        notes text,
                        cell_phone text,
                        send_contact_to_non_mutual boolean,
                        primary key(event_id, email),
                        unique(event_id, gender, attendee_id)
                    );",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "create table if not exists notifications(
                        event_id text not null,
                        kind text not null,
                        claimed_at integer not null,
                        primary key(event_id, kind)
                    );",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "create table if not exists scheduler_state(
                        name text primary key not null,
                        value integer not null
                    );",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "create table if not exists scheduled_jobs(
                        job_key text primary key not null,
                        kind text not null,
                        event_id text not null,
                        due_at integer not null,
                        completed_at integer
                    );",
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// All attendees of an event ordered by ID.
    pub async fn get_attendees(&self, event_id: &str) -> anyhow::Result<Vec<Attendee>> {
        let rows: Vec<AttendeeRow> = sqlx::query_as(
            "select * from event_attendees
                        where event_id = ?
                        order by attendee_id, gender",
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Attendee::try_from).collect()
    }

    /// Attendees who showed up but have not submitted a match form.
    pub async fn get_attendees_to_remind(&self, event_id: &str) -> anyhow::Result<Vec<Attendee>> {
        let rows: Vec<AttendeeRow> = sqlx::query_as(
            "select * from event_attendees
                        where event_id = ? and in_attendance = true and interests is null
                        order by attendee_id, gender",
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Attendee::try_from).collect()
    }

    /// Insert roster rows in one transaction.
    ///
    /// An email already stored only gets its names refreshed, never its ID or gender.
    pub async fn add_attendees(&self, event_id: &str, attendees: &[Attendee]) -> anyhow::Result<()> {
        log::debug!("Adding {} attendees to event {}", attendees.len(), event_id);
        let mut tx = self.db.begin().await?;
        for attendee in attendees {
            sqlx::query(
                "insert into event_attendees(event_id, email, attendee_id, first_name, last_name, gender)
                            values(?, ?, ?, ?, ?, ?)
                            on conflict(event_id, email) do update set
                                first_name = excluded.first_name,
                                last_name = excluded.last_name",
            )
            .bind(event_id)
            .bind(&attendee.email)
            .bind(attendee.id)
            .bind(&attendee.first_name)
            .bind(&attendee.last_name)
            .bind(attendee.gender.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn mark_attendance(&self, event_id: &str, email: &str) -> anyhow::Result<()> {
        Ok(sqlx::query(
            "update event_attendees set in_attendance = true
                        where event_id = ? and email = ?",
        )
        .bind(event_id)
        .bind(email)
        .execute(&self.db)
        .await
        .map(|_| ())?)
    }

    pub async fn save_submission(
        &self,
        event_id: &str,
        email: &str,
        submission: &Submission,
    ) -> anyhow::Result<()> {
        log::debug!("Saving match form of {} for event {}", email, event_id);
        let interests = Interests::Submitted(submission.interests.clone());
        Ok(sqlx::query(
            "update event_attendees set
                        interests = ?,
                        feedback = ?,
                        referral_info = ?,
                        website_feedback = ?,
                        notes = ?,
                        cell_phone = ?,
                        send_contact_to_non_mutual = ?
                    where event_id = ? and email = ?",
        )
        .bind(interests.to_column())
        .bind(&submission.feedback)
        .bind(&submission.referral_info)
        .bind(&submission.website_feedback)
        .bind(&submission.notes)
        .bind(&submission.cell_phone)
        .bind(submission.send_contact_to_non_mutual)
        .bind(event_id)
        .bind(email)
        .execute(&self.db)
        .await
        .map(|_| ())?)
    }

    /// Record that `kind` is being sent for an event. Returns false if it already was.
    pub async fn claim_notification(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "insert or ignore into notifications(event_id, kind, claimed_at) values(?, ?, ?)",
        )
        .bind(event_id)
        .bind(kind.as_str())
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Undo a claim whose batch never started.
    pub async fn release_notification(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> anyhow::Result<()> {
        Ok(
            sqlx::query("delete from notifications where event_id = ? and kind = ?")
                .bind(event_id)
                .bind(kind.as_str())
                .execute(&self.db)
                .await
                .map(|_| ())?,
        )
    }

    /// End of the last window of ended events that was fully scheduled.
    pub async fn get_checked_until(&self) -> anyhow::Result<Option<OffsetDateTime>> {
        let value: Option<i64> =
            sqlx::query_scalar("select value from scheduler_state where name = 'checked_until'")
                .fetch_optional(&self.db)
                .await?;

        Ok(value.map(OffsetDateTime::from_unix_timestamp).transpose()?)
    }

    pub async fn set_checked_until(&self, at: OffsetDateTime) -> anyhow::Result<()> {
        Ok(sqlx::query(
            "insert into scheduler_state(name, value) values('checked_until', ?)
                        on conflict(name) do update set value = excluded.value",
        )
        .bind(at.unix_timestamp())
        .execute(&self.db)
        .await
        .map(|_| ())?)
    }

    /// Store a job unless its key is already known. Returns true if it was added.
    pub async fn schedule_job(&self, job: &Job) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "insert or ignore into scheduled_jobs(job_key, kind, event_id, due_at)
                        values(?, ?, ?, ?)",
        )
        .bind(&job.key)
        .bind(job.kind.as_str())
        .bind(&job.event_id)
        .bind(job.due_at.unix_timestamp())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Incomplete jobs due at or before `now`, oldest first.
    pub async fn get_due_jobs(&self, now: OffsetDateTime) -> anyhow::Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "select job_key, kind, event_id, due_at from scheduled_jobs
                        where completed_at is null and due_at <= ?
                        order by due_at",
        )
        .bind(now.unix_timestamp())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    pub async fn complete_job(&self, key: &str, now: OffsetDateTime) -> anyhow::Result<()> {
        Ok(
            sqlx::query("update scheduled_jobs set completed_at = ? where job_key = ?")
                .bind(now.unix_timestamp())
                .bind(key)
                .execute(&self.db)
                .await
                .map(|_| ())?,
        )
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::core::attendee::Gender;

    fn roster() -> Vec<Attendee> {
        vec![
            Attendee::new(1, "Mark", "Young", "mark@example.org", Gender::Male),
            Attendee::new(1, "Anna", "Bell", "anna@example.org", Gender::Female),
            Attendee::new(2, "Zoe", "Adams", "zoe@example.org", Gender::Female),
        ]
    }

    #[tokio::test]
    async fn test_attendee_round_trip() {
        let db = EventDb::in_memory().await.unwrap();
        db.add_attendees("e1", &roster()).await.unwrap();

        let stored = db.get_attendees("e1").await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(roster().iter().all(|a| stored.contains(a)));
        assert!(db.get_attendees("e2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let db = EventDb::in_memory().await.unwrap();
        db.add_attendees("e1", &roster()).await.unwrap();

        let renamed = Attendee::new(7, "Marcus", "Young", "mark@example.org", Gender::Female);
        db.add_attendees("e1", &[renamed]).await.unwrap();

        let stored = db.get_attendees("e1").await.unwrap();
        let mark = stored.iter().find(|a| a.email == "mark@example.org").unwrap();
        assert_eq!((mark.id, mark.gender), (1, Gender::Male));
        assert_eq!(mark.first_name, "Marcus");
    }

    #[tokio::test]
    async fn test_insert_is_atomic() {
        let db = EventDb::in_memory().await.unwrap();
        db.add_attendees("e1", &roster()).await.unwrap();

        // The second row reuses (Female, 2) and fails the whole batch
        let batch = vec![
            Attendee::new(2, "Aaron", "Abbot", "aaron@example.org", Gender::Male),
            Attendee::new(2, "Beth", "Cole", "beth@example.org", Gender::Female),
        ];
        assert!(db.add_attendees("e1", &batch).await.is_err());
        assert_eq!(db.get_attendees("e1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_submission_and_reminders() {
        let db = EventDb::in_memory().await.unwrap();
        db.add_attendees("e1", &roster()).await.unwrap();
        db.mark_attendance("e1", "mark@example.org").await.unwrap();
        db.mark_attendance("e1", "anna@example.org").await.unwrap();
        db.mark_attendance("e1", "anna@example.org").await.unwrap();

        let to_remind = db.get_attendees_to_remind("e1").await.unwrap();
        assert_eq!(to_remind.len(), 2);

        let submission = Submission {
            notes: Some("Lovely evening".to_owned()),
            send_contact_to_non_mutual: true,
            ..Default::default()
        };
        db.save_submission("e1", "anna@example.org", &submission)
            .await
            .unwrap();

        let to_remind = db.get_attendees_to_remind("e1").await.unwrap();
        assert_eq!(to_remind.len(), 1);
        assert_eq!(to_remind[0].email, "mark@example.org");

        let stored = db.get_attendees("e1").await.unwrap();
        let anna = stored.iter().find(|a| a.email == "anna@example.org").unwrap();
        assert_eq!(anna.interests, Interests::Submitted(vec![]));
        assert_eq!(anna.notes.as_deref(), Some("Lovely evening"));
        assert!(anna.shares_contact());
        assert!(anna.in_attendance);

        let zoe = stored.iter().find(|a| a.email == "zoe@example.org").unwrap();
        assert_eq!(zoe.interests, Interests::NotSubmitted);
        assert!(!zoe.in_attendance);
    }

    #[tokio::test]
    async fn test_notification_claims() {
        let db = EventDb::in_memory().await.unwrap();

        assert!(db.claim_notification("e1", NotificationKind::Results).await.unwrap());
        assert!(!db.claim_notification("e1", NotificationKind::Results).await.unwrap());
        assert!(db.claim_notification("e1", NotificationKind::Reminder).await.unwrap());

        db.release_notification("e1", NotificationKind::Results).await.unwrap();
        assert!(db.claim_notification("e1", NotificationKind::Results).await.unwrap());
    }

    #[tokio::test]
    async fn test_checked_until() {
        let db = EventDb::in_memory().await.unwrap();
        assert_eq!(db.get_checked_until().await.unwrap(), None);

        let at = OffsetDateTime::from_unix_timestamp(1_714_867_200).unwrap();
        db.set_checked_until(at).await.unwrap();
        db.set_checked_until(at + Duration::days(1)).await.unwrap();
        assert_eq!(db.get_checked_until().await.unwrap(), Some(at + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_jobs() {
        let db = EventDb::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let soon = Job::new(JobKind::Reminder, "e1", now - Duration::minutes(1));
        let later = Job::new(JobKind::Results, "e1", now + Duration::hours(3));

        assert!(db.schedule_job(&soon).await.unwrap());
        assert!(!db.schedule_job(&soon).await.unwrap());
        assert!(db.schedule_job(&later).await.unwrap());

        let due = db.get_due_jobs(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, soon.key);

        db.complete_job(&soon.key, now).await.unwrap();
        assert!(db.get_due_jobs(now).await.unwrap().is_empty());
        assert_eq!(
            db.get_due_jobs(now + Duration::hours(4)).await.unwrap().len(),
            1
        );
    }
}

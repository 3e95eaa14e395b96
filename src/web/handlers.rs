use std::{convert::Infallible, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use warp::{
    http::StatusCode,
    reply::{Json, WithStatus},
};

use crate::{
    core::{
        attendee::Identity,
        event::Event,
        interest::RawInterest,
        service::{EventService, MatchForm},
    },
    error::{ErrorKind, QueryResult},
};

/// A Json struct for admin credentials
#[derive(Serialize, Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A Json struct for admin requests about one event
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminEventRequest {
    pub event_id: String,
    pub username: String,
    pub password: String,
}

/// A Json struct identifying an attendee of one event
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    pub event_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A Json struct for a match form submission
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub event_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub interests: Vec<RawInterest>,
    pub notes: Option<String>,
    pub feedback: Option<String>,
    pub referral_info: Option<String>,
    pub cell_phone: Option<String>,
    pub website_feedback: Option<String>,
    #[serde(default)]
    pub send_contact_to_non_mutual: bool,
}

impl From<MatchRequest> for MatchForm {
    fn from(request: MatchRequest) -> Self {
        MatchForm {
            event_id: request.event_id,
            identity: Identity {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
            },
            interests: request.interests,
            notes: request.notes,
            feedback: request.feedback,
            referral_info: request.referral_info,
            cell_phone: request.cell_phone,
            website_feedback: request.website_feedback,
            send_contact_to_non_mutual: request.send_contact_to_non_mutual,
        }
    }
}

/// A Json struct for the contact form
#[derive(Serialize, Deserialize, Debug)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct MessageReply<'a> {
    message: &'a str,
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Upstream | ErrorKind::Delivery => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_reply(message: &str, code: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ErrorReply { error: message }), code)
}

pub fn to_http_output<T: Serialize>(result: QueryResult<T>) -> Result<WithStatus<Json>, Infallible> {
    match result {
        Ok(data) => Ok(warp::reply::with_status(
            warp::reply::json(&data),
            StatusCode::OK,
        )),
        Err(e) => {
            log::warn!("{}", e);
            Ok(error_reply(&e.message, status_of(e.kind)))
        }
    }
}

pub fn to_http_none_or_error(
    result: QueryResult<()>,
    success: &str,
) -> Result<WithStatus<Json>, Infallible> {
    to_http_output(result.map(|_| MessageReply { message: success }))
}

pub async fn get_events(service: Arc<EventService>) -> Result<WithStatus<Json>, Infallible> {
    to_http_output(service.open_events(OffsetDateTime::now_utc()).await)
}

async fn login(service: &EventService, credentials: &Credentials) -> QueryResult<Vec<Event>> {
    service.authenticate(&credentials.username, &credentials.password)?;
    service.all_events().await
}

pub async fn admin_login(
    credentials: Credentials,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    to_http_output(login(&service, &credentials).await)
}

pub async fn admin_event_participants(
    request: AdminEventRequest,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    if let Err(e) = service.authenticate(&request.username, &request.password) {
        return to_http_output::<()>(Err(e));
    }
    to_http_output(service.admin_roster(&request.event_id).await)
}

pub async fn event_participants(
    request: ParticipantRequest,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    let identity = Identity {
        first_name: request.first_name,
        last_name: request.last_name,
        email: request.email,
    };
    to_http_output(service.attendee_roster(&request.event_id, identity).await)
}

pub async fn submit_match_form(
    request: MatchRequest,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    to_http_none_or_error(
        service
            .submit_match_form(request.into(), OffsetDateTime::now_utc())
            .await,
        "Match form submitted successfully.",
    )
}

async fn results_target(service: &EventService, request: &AdminEventRequest) -> QueryResult<Event> {
    service.authenticate(&request.username, &request.password)?;
    service.find_event(&request.event_id).await
}

/// Starts the results dispatch and answers before the batch finishes.
pub async fn send_results(
    request: AdminEventRequest,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    let event = match results_target(&service, &request).await {
        Ok(event) => event,
        Err(e) => return to_http_output::<()>(Err(e)),
    };

    tokio::spawn(async move {
        match service.send_results(&event).await {
            Ok(report) => log::info!(
                "Results of {}: {} sent, {} failed",
                event.id,
                report.sent,
                report.failed
            ),
            Err(e) => log::error!("Error sending results of {}: {}", event.id, e),
        }
    });

    Ok(warp::reply::with_status(
        warp::reply::json(&MessageReply {
            message: "Results dispatch started.",
        }),
        StatusCode::ACCEPTED,
    ))
}

pub async fn contact(
    request: ContactRequest,
    service: Arc<EventService>,
) -> Result<WithStatus<Json>, Infallible> {
    to_http_none_or_error(
        service
            .contact(&request.name, &request.email, &request.message)
            .await,
        "Contact query submitted successfully.",
    )
}

use std::{convert::Infallible, sync::Arc};

use serde::de::DeserializeOwned;
use warp::{reject::Rejection, Filter};

use crate::core::service::EventService;

use super::handlers::{
    admin_event_participants, admin_login, contact, event_participants, get_events, send_results,
    submit_match_form,
};

/// Largest accepted request body
const MAX_BODY: u64 = 16 * 1024;

pub fn with_service(
    service: Arc<EventService>,
) -> impl Filter<Extract = (Arc<EventService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY).and(warp::body::json())
}

fn admin_filters(
    service: Arc<EventService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let login = warp::path!("admin" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(admin_login);

    let participants = warp::path!("admin" / "event-participants")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(admin_event_participants);

    let results = warp::path!("admin" / "send-results")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service))
        .and_then(send_results);

    login.or(participants).or(results)
}

pub fn api_filters(
    service: Arc<EventService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let events = warp::path!("events")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(get_events);

    let participants = warp::path!("event-participants")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(event_participants);

    let match_form = warp::path!("match")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(submit_match_form);

    let contact = warp::path!("contact")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(contact);

    events
        .or(participants)
        .or(match_form)
        .or(contact)
        .or(admin_filters(service))
}

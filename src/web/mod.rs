use std::{convert::Infallible, sync::Arc};

use filters::api_filters;
use handlers::error_reply;
use warp::{http::Method, http::StatusCode, reject::Rejection, Filter};

use crate::{core::service::EventService, settings::Settings};

pub mod filters;
pub mod handlers;

pub(crate) async fn handle_rejection(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, msg) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        log::error!("{}", err);
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if let Some(err) = err.find::<warp::reject::PayloadTooLarge>() {
        log::error!("{}", err);
        (StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
    } else if let Some(err) = err.find::<warp::reject::LengthRequired>() {
        log::error!("{}", err);
        (StatusCode::LENGTH_REQUIRED, err.to_string())
    } else if let Some(err) = err.find::<warp::reject::UnsupportedMediaType>() {
        log::error!("{}", err);
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, err.to_string())
    } else if let Some(err) = err.find::<warp::reject::MethodNotAllowed>() {
        log::error!("Method Not Allowed: {}", err);
        (StatusCode::METHOD_NOT_ALLOWED, err.to_string())
    } else {
        log::error!("Unhandled Rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    Ok(error_reply(&msg, code))
}

pub async fn run_http_server(service: Arc<EventService>, settings: Arc<Settings>) -> anyhow::Result<()> {
    let cors = warp::cors()
        .allow_headers(vec![
            "User-Agent",
            "Sec-Fetch-Mode",
            "Referer",
            "Origin",
            "Content-Type",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
        ])
        .allow_methods(&[Method::GET, Method::POST, Method::OPTIONS]);

    let cors = match &settings.client_origin {
        Some(origin) => cors.allow_origin(origin.as_str()),
        None => cors.allow_any_origin(),
    };

    let routes = api_filters(service).recover(handle_rejection);
    let port = settings.web_port.unwrap_or(8080);

    log::info!("Listening on port {}", port);
    warp::serve(routes.with(cors))
        .run(([0, 0, 0, 0], port))
        .await;

    Ok(())
}

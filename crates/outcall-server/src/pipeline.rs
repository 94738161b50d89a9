//! HTTP request pipeline.
//!
//! Every request goes through the same ordered stages and stops at the first
//! failure: parse the form, check the token, resolve the call, render the call
//! file, resolve the schedule and publish. The outcome is always HTTP 200 with
//! an [`ApiResponse`] body.

use std::sync::Arc;

use axum::Router;
use axum::body::to_bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use chrono::{DateTime, Local};
use outcall_core::{CallFile, CallRequestResolver, FieldLookup, ScheduleResolver, field};
use outcall_protocol::{
    ApiResponse, FormFields, MAX_FORM_SIZE, RESPONSE_CONTENT_TYPE, encode_response,
};
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::error::CallError;
use crate::lifecycle::ActivityMonitor;
use crate::publisher::CallFilePublisher;

/// Source of the reference instant for schedule expressions.
pub type Clock = fn() -> DateTime<Local>;

/// Turns submitted form fields into published call files.
pub struct RequestPipeline {
    config: Arc<ApiConfig>,
    publisher: CallFilePublisher,
    schedules: ScheduleResolver,
    clock: Clock,
}

impl RequestPipeline {
    pub fn new(config: Arc<ApiConfig>) -> Self {
        let publisher = CallFilePublisher::from_config(&config);
        Self {
            config,
            publisher,
            schedules: ScheduleResolver::new(),
            clock: Local::now,
        }
    }

    /// Replaces the wall clock used to resolve schedules.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn publisher(&self) -> &CallFilePublisher {
        &self.publisher
    }

    /// Checks the submitted token against the configured secret.
    ///
    /// An empty configured token refuses every request, even one that also
    /// sends an empty token.
    pub fn authenticate<F: FieldLookup + ?Sized>(&self, fields: &F) -> Result<(), CallError> {
        let token = fields.field(field::TOKEN).unwrap_or_default();
        if self.config.api_token.is_empty() || !tokens_match(token, &self.config.api_token) {
            return Err(CallError::Unauthorized);
        }
        Ok(())
    }

    /// Runs every stage after parsing. Returns the published call-file name.
    pub async fn process(&self, fields: &FormFields) -> Result<String, CallError> {
        self.authenticate(fields)?;

        let request = CallRequestResolver::new(&self.config.call).resolve(fields)?;
        let contents = CallFile::generate(&request).to_string();
        let schedule = self.schedules.resolve(&request.schedule, &(self.clock)());

        let name = self.publisher.publish(contents, schedule).await?;
        info!(
            name = %name,
            channel = %request.channel,
            at = ?schedule.instant(),
            "Call file published"
        );
        Ok(name)
    }

    /// Builds the router: `/` and every other path reach the call handler.
    pub fn router(self: Arc<Self>, activity: ActivityMonitor) -> Router {
        Router::new()
            .route("/", any(handle_call))
            .fallback(handle_call)
            .layer(middleware::from_fn_with_state(activity, track_activity))
            .layer(DefaultBodyLimit::max(MAX_FORM_SIZE))
            .with_state(self)
    }
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

enum BodyKind {
    Absent,
    UrlEncoded,
    Multipart,
}

fn body_kind(headers: &HeaderMap) -> Result<BodyKind, CallError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(BodyKind::Absent);
    };
    let value = value.to_str().map_err(|_| CallError::BadRequest)?;
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/x-www-form-urlencoded" => Ok(BodyKind::UrlEncoded),
        "multipart/form-data" => Ok(BodyKind::Multipart),
        other => {
            debug!(content_type = other, "Unsupported request body");
            Err(CallError::BadRequest)
        }
    }
}

/// Collects body fields followed by query fields, so body values win.
pub async fn extract_fields(req: Request) -> Result<FormFields, CallError> {
    let query = match req.uri().query() {
        Some(q) => parse_urlencoded(q.as_bytes(), "query string")?,
        None => FormFields::new(),
    };

    let mut fields = match body_kind(req.headers())? {
        BodyKind::Absent => FormFields::new(),
        BodyKind::UrlEncoded => {
            let body = to_bytes(req.into_body(), MAX_FORM_SIZE)
                .await
                .map_err(|e| {
                    debug!(error = %e, "Failed to read form body");
                    CallError::BadRequest
                })?;
            parse_urlencoded(&body, "form body")?
        }
        BodyKind::Multipart => multipart_fields(req).await?,
    };
    fields.append(query);
    Ok(fields)
}

fn parse_urlencoded(input: &[u8], source: &'static str) -> Result<FormFields, CallError> {
    FormFields::try_from_urlencoded(input).map_err(|e| {
        debug!(error = %e, source, "Rejected urlencoded fields");
        CallError::BadRequest
    })
}

async fn multipart_fields(req: Request) -> Result<FormFields, CallError> {
    let bad_request = |e: &dyn std::fmt::Display| {
        debug!(error = %e, "Malformed multipart body");
        CallError::BadRequest
    };

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| bad_request(&e))?;
    let mut fields = FormFields::new();
    while let Some(part) = multipart.next_field().await.map_err(|e| bad_request(&e))? {
        if part.file_name().is_some() {
            continue;
        }
        let Some(name) = part.name().map(str::to_owned) else {
            continue;
        };
        let value = part.text().await.map_err(|e| bad_request(&e))?;
        fields.push(name, value);
    }
    Ok(fields)
}

async fn handle_call(State(pipeline): State<Arc<RequestPipeline>>, req: Request) -> Response {
    let outcome = match extract_fields(req).await {
        Ok(fields) => pipeline.process(&fields).await.map(|_| ()),
        Err(e) => Err(e),
    };

    let response = match outcome {
        Ok(()) => ApiResponse::ok(),
        Err(e) => {
            warn!(reason = %e, "Call request rejected");
            ApiResponse::error(e.to_string())
        }
    };
    respond(&response)
}

fn respond(response: &ApiResponse) -> Response {
    match encode_response(response) {
        Ok(body) => ([(header::CONTENT_TYPE, RESPONSE_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn track_activity(
    State(activity): State<ActivityMonitor>,
    req: Request,
    next: Next,
) -> Response {
    activity.touch();
    debug!(method = %req.method(), uri = %req.uri(), "HTTP request");
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    use axum::body::Body;
    use chrono::TimeZone;
    use outcall_core::CallDefaults;
    use outcall_protocol::decode_response;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    use super::*;

    /// Monday 2030-06-03 15:00 local time.
    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2030, 6, 3, 15, 0, 0).unwrap()
    }

    fn spool() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("outgoing")).unwrap();
        dir
    }

    fn open_config(dir: &TempDir) -> ApiConfig {
        ApiConfig::new(dir.path(), "secret").with_call_defaults(CallDefaults {
            prevent_api_application: false,
            ..Default::default()
        })
    }

    fn app_with(config: ApiConfig, activity: ActivityMonitor) -> Router {
        Arc::new(RequestPipeline::new(Arc::new(config)).with_clock(fixed_now)).router(activity)
    }

    fn app(config: ApiConfig) -> Router {
        app_with(config, ActivityMonitor::new())
    }

    fn form(uri: &str, body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: Router, req: Request) -> ApiResponse {
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            RESPONSE_CONTENT_TYPE
        );
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        decode_response(&bytes).unwrap()
    }

    fn published(dir: &TempDir) -> Vec<PathBuf> {
        fs::read_dir(dir.path().join("outgoing"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn only_published(dir: &TempDir) -> PathBuf {
        let mut files = published(dir);
        assert_eq!(files.len(), 1);
        files.remove(0)
    }

    #[tokio::test]
    async fn publishes_requested_call() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form("/", "token=secret&channel=SIP%2F100&application=Dial&data=SIP%2F200"),
        )
        .await;

        assert_eq!(response, ApiResponse::ok());
        let path = only_published(&dir);
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("outgoing-call-")
        );
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Channel: SIP/100\nApplication: Dial\nData: SIP/200\nArchive: no\n"
        );
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized_without_side_effects() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form("/", "token=guess&channel=SIP%2F100&application=Dial"),
        )
        .await;

        assert_eq!(response, ApiResponse::error("Unauthorized"));
        assert!(published(&dir).is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let dir = spool();
        let response = call(app(open_config(&dir)), form("/", "channel=SIP%2F100")).await;
        assert_eq!(response.error, "Unauthorized");
    }

    #[tokio::test]
    async fn incomplete_call_is_rejected() {
        let dir = spool();
        let response = call(app(open_config(&dir)), form("/", "token=secret&channel=")).await;

        assert_eq!(response, ApiResponse::error("Required options not set"));
        assert!(published(&dir).is_empty());
    }

    #[tokio::test]
    async fn scheduled_call_is_stamped_with_resolved_time() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form(
                "/",
                "token=secret&channel=SIP%2F100&application=Dial&schedule=tomorrow+at+9am",
            ),
        )
        .await;

        assert!(response.is_ok());
        let modified = fs::metadata(only_published(&dir))
            .unwrap()
            .modified()
            .unwrap();
        let expected = Local.with_ymd_and_hms(2030, 6, 4, 9, 0, 0).unwrap();
        assert_eq!(modified, SystemTime::from(expected));
    }

    #[tokio::test]
    async fn schedule_inside_a_sentence_is_honoured() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form(
                "/",
                "token=secret&channel=SIP%2F100&application=Dial&schedule=please+call+tomorrow+at+9am",
            ),
        )
        .await;

        assert!(response.is_ok());
        let modified = fs::metadata(only_published(&dir))
            .unwrap()
            .modified()
            .unwrap();
        let expected = Local.with_ymd_and_hms(2030, 6, 4, 9, 0, 0).unwrap();
        assert_eq!(modified, SystemTime::from(expected));
    }

    #[tokio::test]
    async fn unparsed_schedule_falls_back_to_now() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form("/", "token=secret&channel=SIP%2F100&context=default&schedule=gibberish"),
        )
        .await;

        assert!(response.is_ok());
        let modified = fs::metadata(only_published(&dir))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(modified, SystemTime::from(fixed_now()));
    }

    #[tokio::test]
    async fn body_wins_over_query() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form(
                "/?token=wrong&channel=SIP%2F9&context=from-query",
                "token=secret&channel=SIP%2F100",
            ),
        )
        .await;

        assert!(response.is_ok());
        let contents = fs::read_to_string(only_published(&dir)).unwrap();
        assert!(contents.contains("Channel: SIP/100\n"));
        assert!(contents.contains("Context: from-query\n"));
    }

    #[tokio::test]
    async fn query_only_request_on_any_path() {
        let dir = spool();
        let req = Request::builder()
            .method("GET")
            .uri("/call?token=secret&channel=SIP%2F100&context=from-internal&extension=200&priority=1")
            .body(Body::empty())
            .unwrap();

        let response = call(app(open_config(&dir)), req).await;

        assert!(response.is_ok());
        assert_eq!(
            fs::read_to_string(only_published(&dir)).unwrap(),
            "Channel: SIP/100\nContext: from-internal\nExtension: 200\nPriority: 1\nArchive: no\n"
        );
    }

    #[tokio::test]
    async fn multipart_fields_are_read_and_files_ignored() {
        let dir = spool();
        let body = concat!(
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"token\"\r\n\r\n",
            "secret\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"channel\"\r\n\r\n",
            "SIP/100\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"context\"\r\n\r\n",
            "from-internal\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"extension\"; filename=\"x.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "999\r\n",
            "--XyZ--\r\n",
        );
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XyZ")
            .body(Body::from(body))
            .unwrap();

        let response = call(app(open_config(&dir)), req).await;

        assert!(response.is_ok());
        assert_eq!(
            fs::read_to_string(only_published(&dir)).unwrap(),
            "Channel: SIP/100\nContext: from-internal\nArchive: no\n"
        );
    }

    #[tokio::test]
    async fn unsupported_body_is_bad_request() {
        let dir = spool();
        let req = Request::builder()
            .method("POST")
            .uri("/?token=secret&channel=SIP%2F100&context=c")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = call(app(open_config(&dir)), req).await;

        assert_eq!(response, ApiResponse::error("Bad request"));
        assert!(published(&dir).is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        for body in [
            "token=secret&channel=SIP%2F100&application=Dial&data=%zz",
            "token=secret&channel=SIP%2F100&application=Dial&data=%ff",
            "token=secret&channel=SIP%2F100&application=Dial&data=%zz%ff",
            "token=secret;channel=SIP%2F100&application=Dial",
        ] {
            let dir = spool();
            let response = call(app(open_config(&dir)), form("/", body)).await;

            assert_eq!(response, ApiResponse::error("Bad request"), "{body}");
            assert!(published(&dir).is_empty(), "{body}");
        }
    }

    #[tokio::test]
    async fn malformed_query_is_bad_request() {
        let dir = spool();
        let response = call(
            app(open_config(&dir)),
            form(
                "/?context=%G1",
                "token=secret&channel=SIP%2F100&application=Dial",
            ),
        )
        .await;

        assert_eq!(response, ApiResponse::error("Bad request"));
        assert!(published(&dir).is_empty());
    }

    #[tokio::test]
    async fn policy_overrides_caller_application() {
        let dir = spool();
        let config = ApiConfig::new(dir.path(), "secret").with_call_defaults(CallDefaults {
            default_application: "Playback".to_string(),
            default_data: "hello-world".to_string(),
            ..Default::default()
        });

        let response = call(
            app(config),
            form("/", "token=secret&channel=SIP%2F100&application=System&data=rm+-rf"),
        )
        .await;

        assert!(response.is_ok());
        assert_eq!(
            fs::read_to_string(only_published(&dir)).unwrap(),
            "Channel: SIP/100\nApplication: Playback\nData: hello-world\nArchive: no\n"
        );
    }

    #[tokio::test]
    async fn publish_failure_is_reported_generically() {
        let dir = tempdir().unwrap();
        let response = call(
            app(open_config(&dir)),
            form("/", "token=secret&channel=SIP%2F100&application=Dial"),
        )
        .await;

        assert_eq!(
            response,
            ApiResponse::error("Unable to move call file into outgoing directory")
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn requests_touch_activity() {
        let dir = spool();
        let activity = ActivityMonitor::new();
        let app = app_with(open_config(&dir), activity.clone());

        call(app, form("/anything", "token=nope")).await;

        let touched = tokio::time::timeout(Duration::from_millis(100), activity.notified()).await;
        assert!(touched.is_ok());
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secreT", "secret"));
        assert!(!tokens_match("secret2", "secret"));
        assert!(!tokens_match("", "secret"));
    }

    #[test]
    fn empty_configured_token_rejects_everyone() {
        let pipeline = RequestPipeline::new(Arc::new(ApiConfig::new("/tmp", "")));
        let fields = FormFields::try_from_urlencoded(b"token=").unwrap();
        assert_eq!(pipeline.authenticate(&fields), Err(CallError::Unauthorized));
    }
}

use crate::agent::{ ChatAgent, Submission };
use crate::auth::{ session, AuthError, AuthService, SessionKeys, SessionUser };
use crate::cli::{ Args, DeploymentMode };
use crate::config::ConfigError;
use crate::conversation::SessionMode;
use crate::llm::chat::Attachment;
use crate::models::api::{ AnswerResponse, CredentialsForm, RagSubmitForm, StoresResponse, SubmitResponse };
use crate::models::chat::HistoryEntry;
use crate::rag::RagQueryArgs;
use super::error::{ handle_panic, ErrorDetail, ServerError };
use super::templates::Templates;
use super::upload;

use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Form,
    Json,
    extract::{ DefaultBodyLimit, FromRequestParts, Multipart, Path, Request, State },
    extract::multipart::MultipartError,
    http::{ header::{ ACCEPT, SET_COOKIE }, request::Parts, HeaderMap, StatusCode },
    middleware::{ self, Next },
    response::{ Html, IntoResponse, Redirect, Response },
};
use chrono::FixedOffset;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use lazy_static::lazy_static;
use log::{ debug, info, warn };
use minijinja::context;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

/// Room for the non-file form fields on top of the upload limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

lazy_static! {
    static ref LOGIN_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub mode: DeploymentMode,
    pub max_upload_bytes: usize,
    pub history_limit: i64,
    pub display_offset: FixedOffset,
}

impl AppSettings {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let display_offset = FixedOffset::east_opt(args.display_utc_offset_hours * 3600).ok_or_else(||
            ConfigError::Invalid(
                format!("display UTC offset out of range: {}", args.display_utc_offset_hours)
            )
        )?;
        Ok(Self {
            mode: args.mode,
            max_upload_bytes: args.max_upload_bytes,
            history_limit: args.history_limit.max(1),
            display_offset,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub auth: AuthService,
    pub sessions: SessionKeys,
    pub templates: Arc<Templates>,
    pub settings: Arc<AppSettings>,
}

/// The logged-in user. Browsers asking for HTML are sent to the login page,
/// everything else gets a 401.
pub struct CurrentUser(pub SessionUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState
    ) -> Result<Self, Self::Rejection> {
        let wants_html = parts.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/html"));
        let reject = || {
            if wants_html {
                Redirect::to("/login").into_response()
            } else {
                ServerError::Unauthorized.into_response()
            }
        };

        let token = session::token_from_headers(&parts.headers).ok_or_else(reject)?;
        let user = state.sessions.verify(&token).map_err(|_| reject())?;
        match state.auth.get_user_by_id(user.id).await {
            Ok(Some(_)) => Ok(CurrentUser(user)),
            Ok(None) => Err(reject()),
            Err(e) => Err(ServerError::from(e).into_response()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(index_handler))
        .route("/submit", post(submit_handler))
        .route("/history", get(history_handler))
        .route("/history/answer/{id}", get(answer_handler))
        .route("/register", get(register_page).post(register_handler))
        .route("/login", get(login_page).post(login_handler))
        .route("/logout", get(logout_handler))
        .route("/rag/stores", get(rag_stores_handler))
        .route("/rag/submit", post(rag_submit_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(state.clone(), expose_error_details))
        .with_state(state)
}

/// Swaps the generic 5xx body for the raw error outside production.
async fn expose_error_details(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if !state.settings.mode.exposes_errors() {
        return response;
    }
    (response.status(), Json(json!({ "error": detail }))).into_response()
}

async fn load_history(state: &AppState, user_id: i64) -> Result<Vec<HistoryEntry>, ServerError> {
    let records = state.agent.history().recent(user_id, state.settings.history_limit).await?;
    Ok(
        records
            .iter()
            .map(|r| r.display(state.settings.display_offset))
            .collect()
    )
}

async fn index_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser
) -> Result<Html<String>, ServerError> {
    let history = load_history(&state, user.id).await?;
    let html = state.templates.render(
        "index.html",
        context! {
        username => user.username,
        history => history,
    }
    )?;
    Ok(Html(html))
}

async fn history_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser
) -> Result<Html<String>, ServerError> {
    let history = load_history(&state, user.id).await?;
    Ok(Html(state.templates.render("history.html", context! { history => history })?))
}

async fn answer_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(history_id): Path<i64>
) -> Result<Json<AnswerResponse>, ServerError> {
    match state.agent.history().answer_for(user.id, history_id).await? {
        Some(record) => Ok(Json(AnswerResponse { answer: record.message })),
        None => Err(ServerError::NotFound("No answer found for this question".into())),
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(limit)
    } else {
        ServerError::BadRequest(e.body_text())
    }
}

async fn submit_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart
) -> Result<Json<SubmitResponse>, ServerError> {
    let limit = state.settings.max_upload_bytes;
    let mut message = String::new();
    let mut session_mode: Option<String> = None;
    let mut file: Option<Attachment> = None;

    while
        let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                message = field.text().await.map_err(|e| multipart_error(e, limit))?;
            }
            "session_mode" => {
                session_mode = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

                // Browsers send an empty part when no file was chosen.
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                if data.len() > limit {
                    return Err(ServerError::PayloadTooLarge(limit));
                }
                file = Some(Attachment {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => debug!("Ignoring form field {}", other),
        }
    }

    if let Some(f) = &file {
        if !upload::allowed_file(&f.filename) {
            warn!("Rejected upload {} from user {}", f.filename, user.id);
            return Ok(Json(SubmitResponse { message: upload::unsupported_message(&f.filename) }));
        }
        info!("File uploaded: {} ({}, {} bytes)", f.filename, f.content_type, f.data.len());
    }

    if message.trim().is_empty() && file.is_none() {
        return Ok(Json(SubmitResponse { message: "Please enter a message.".into() }));
    }

    let submission = Submission {
        text: message,
        file,
        mode: SessionMode::from_form(session_mode.as_deref()),
    };
    let reply = state.agent.respond(user.id, submission).await;
    Ok(Json(SubmitResponse { message: reply.text }))
}

async fn rag_stores_handler(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser
) -> Result<Json<StoresResponse>, ServerError> {
    let stores = state.agent.vector_stores().await?;
    Ok(Json(StoresResponse { stores }))
}

async fn rag_submit_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<RagSubmitForm>
) -> Result<Json<SubmitResponse>, ServerError> {
    if form.vector_store_id.trim().is_empty() {
        return Err(ServerError::BadRequest("vector_store_id is required".into()));
    }
    if form.message.trim().is_empty() {
        return Ok(Json(SubmitResponse { message: "Please enter a message.".into() }));
    }

    let query = RagQueryArgs {
        query: form.message,
        vector_store_id: form.vector_store_id.trim().to_string(),
        limit: form.max_results,
    };
    let mode = SessionMode::from_form(form.session_mode.as_deref());
    let reply = state.agent.respond_from_store(user.id, query, mode).await;
    Ok(Json(SubmitResponse { message: reply.text }))
}

fn render_form(
    state: &AppState,
    template: &str,
    status: StatusCode,
    error: Option<String>,
    username: Option<&str>
) -> Result<Response, ServerError> {
    let html = state.templates.render(template, context! { error => error, username => username })?;
    Ok((status, Html(html)).into_response())
}

fn start_session(state: &AppState, user: &crate::models::chat::User) -> Result<Response, ServerError> {
    let token = state.sessions.issue(user)?;
    Ok(([(SET_COOKIE, state.sessions.cookie(&token))], Redirect::to("/")).into_response())
}

async fn register_page(State(state): State<AppState>) -> Result<Response, ServerError> {
    render_form(&state, "register.html", StatusCode::OK, None, None)
}

async fn register_handler(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>
) -> Result<Response, ServerError> {
    match state.auth.register(&form.username, &form.password).await {
        Ok(user) => start_session(&state, &user),
        Err(e) if e.is_user_facing() => {
            render_form(&state, "register.html", StatusCode::BAD_REQUEST, Some(e.to_string()), Some(form.username.as_str()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn login_page(State(state): State<AppState>) -> Result<Response, ServerError> {
    render_form(&state, "login.html", StatusCode::OK, None, None)
}

async fn login_handler(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>
) -> Result<Response, ServerError> {
    if LOGIN_LIMITER.check().is_err() {
        warn!("Login rate limit exceeded");
        return render_form(
            &state,
            "login.html",
            StatusCode::TOO_MANY_REQUESTS,
            Some("Too many login attempts. Please wait and try again.".into()),
            Some(form.username.as_str())
        );
    }

    match state.auth.login(&form.username, &form.password).await {
        Ok(user) => start_session(&state, &user),
        Err(e @ AuthError::InvalidCredentials) => {
            warn!("Failed login for {}", form.username);
            render_form(&state, "login.html", StatusCode::UNAUTHORIZED, Some(e.to_string()), Some(form.username.as_str()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = session::token_from_headers(&headers).and_then(|t| state.sessions.verify(&t).ok());
    if let Some(user) = user {
        state.agent.end_conversation(user.id).await;
        info!("User {} logged out", user.username);
    }
    ([(SET_COOKIE, session::clear_cookie())], Redirect::to("/login")).into_response()
}

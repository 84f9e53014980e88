use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use uuid::Uuid;

use crate::controller::{ChatController, SendOutcome};
use crate::session::{Message, Session, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ChatController>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub messages: usize,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            updated_at: s.updated_at,
            messages: s.messages.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub current: Uuid,
    pub sending: bool,
}

fn list_response(view: &SessionStore, sending: bool) -> SessionListResponse {
    // Sidebar order: most recently updated first.
    let mut sessions: Vec<SessionSummary> = view.sessions().iter().map(Into::into).collect();
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    SessionListResponse { sessions, current: view.current_id(), sending }
}

async fn create_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Json<Session> {
    let session = state.controller.create(body.title.as_deref()).await;
    Json(session)
}

async fn list_sessions(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<SessionListResponse> {
    let view = state.controller.view().await;
    let sending = state.controller.is_sending().await;
    Json(list_response(&view, sending))
}

async fn get_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<Session>, StatusCode> {
    match state.controller.transcript(id).await {
        Some(session) => Ok(Json(session)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub current: Uuid,
}

async fn select_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<CurrentResponse>, StatusCode> {
    if state.controller.select(id).await {
        Ok(Json(CurrentResponse { current: id }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionBody {
    pub title: String,
}

async fn rename_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    Json(body): Json<RenameSessionBody>,
) -> Result<Json<Session>, StatusCode> {
    match state.controller.rename(id, &body.title).await {
        Some(session) => Ok(Json(session)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn delete_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<CurrentResponse>, StatusCode> {
    match state.controller.delete(id).await {
        Some(current) => Ok(Json(CurrentResponse { current })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SendResponse {
    Replied { message: Message },
    Ignored,
    Superseded,
}

async fn send_message(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<SendBody>,
) -> Json<SendResponse> {
    let response = match state.controller.send(&body.content).await {
        SendOutcome::Replied(message) => SendResponse::Replied { message },
        SendOutcome::Ignored => SendResponse::Ignored,
        SendOutcome::Superseded => SendResponse::Superseded,
    };
    Json(response)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route(
            "/v1/sessions/:id",
            get(get_session).patch(rename_session).delete(delete_session),
        )
        .route("/v1/sessions/:id/select", post(select_session))
        .route("/v1/chat", post(send_message))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

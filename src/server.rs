//! HTTP transport: health check, chat, streamed chat and history reset.

use anyhow::{Context, Result};
use async_stream::stream;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{delete, get, post},
    Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;
use crate::session::SessionStore;
use crate::types::{ChatReply, ConversationMessage};

const MAX_QUERY_CHARS: usize = 5000;

/// Shared by every handler.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub sessions: Arc<dyn SessionStore>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<ConversationMessage>>,
}

type ApiFailure = (StatusCode, Json<Value>);

impl ChatBody {
    fn validate(&self) -> Result<(), ApiFailure> {
        let chars = self.query.chars().count();
        if chars == 0 || chars > MAX_QUERY_CHARS {
            warn!(chars, "rejected chat query");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "detail": format!("query must be between 1 and {} characters", MAX_QUERY_CHARS)
                })),
            ));
        }
        Ok(())
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Stored session history wins over history sent with the request.
    async fn history(&self, sessions: &dyn SessionStore) -> Vec<ConversationMessage> {
        if let Some(id) = self.session_id() {
            let stored = sessions.get_history(id).await;
            if !stored.is_empty() {
                return stored;
            }
        }
        self.history.clone().unwrap_or_default()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat/history/:session_id", delete(clear_history))
        .with_state(state)
}

/// GET / - health check
pub async fn health() -> Json<Value> {
    info!("health check");
    Json(json!({
        "status": "online",
        "message": "Welcome to the Tennis AI Chatbot API",
    }))
}

/// POST /api/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiFailure> {
    body.validate()?;
    info!(chars = body.query.len(), session = ?body.session_id(), "chat request");

    let history = body.history(state.sessions.as_ref()).await;
    let reply = state.orchestrator.respond(&body.query, &history).await;
    if let Some(id) = body.session_id() {
        state
            .sessions
            .update_history(id, &body.query, &reply.response)
            .await;
    }
    Ok(Json(reply))
}

/// POST /api/chat/stream - answer fragments as server-sent events
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiFailure> {
    body.validate()?;
    info!(chars = body.query.len(), session = ?body.session_id(), "streaming chat request");

    let history = body.history(state.sessions.as_ref()).await;
    let mut fragments = state.orchestrator.respond_stream(&body.query, &history);
    let sessions = Arc::clone(&state.sessions);
    let session_id = body.session_id().map(str::to_string);
    let query = body.query;

    let events = stream! {
        let mut answer = String::new();
        while let Some(fragment) = fragments.next().await {
            answer.push_str(&fragment);
            yield Ok::<_, Infallible>(Event::default().data(sse_data(&fragment)));
        }
        if let Some(id) = session_id {
            sessions.update_history(&id, &query, &answer).await;
        }
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE data may not carry carriage returns; line breaks become `\n`.
fn sse_data(fragment: &str) -> String {
    fragment.replace("\r\n", "\n").replace('\r', "\n")
}

/// DELETE /api/chat/history/:session_id
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.sessions.clear_history(&session_id).await;
    info!(session_id = %session_id, "history cleared");
    StatusCode::NO_CONTENT
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Chat server listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::web_search::fake::FakeWebSearch;
    use crate::llm::mock::ScriptedProvider;
    use crate::llm::GenerationSettings;
    use crate::session::InMemorySessionStore;
    use crate::tools::ToolRegistry;
    use crate::types::{LlmTurn, Role};
    use axum::response::IntoResponse;
    use std::time::Duration;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn state(provider: Arc<ScriptedProvider>) -> Arc<AppState> {
        let orchestrator = Orchestrator::new(
            provider,
            Arc::new(ToolRegistry::new()),
            Arc::new(FakeWebSearch::with_context("ctx")),
            GenerationSettings {
                model: "m".into(),
                max_tokens: 64,
                temperature: 0.0,
            },
            "system",
        );
        Arc::new(AppState {
            orchestrator,
            sessions: Arc::new(InMemorySessionStore::new(20, Duration::from_secs(60))),
        })
    }

    fn body(query: &str, session_id: Option<&str>) -> ChatBody {
        ChatBody {
            query: query.to_string(),
            session_id: session_id.map(str::to_string),
            history: None,
        }
    }

    fn answer(text: &str) -> std::result::Result<LlmTurn, String> {
        Ok(LlmTurn::FinalText(text.to_string()))
    }

    #[test]
    fn test_health() {
        rt().block_on(async {
            let Json(value) = health().await;
            assert_eq!(value["status"], "online");
        });
    }

    #[test]
    fn test_query_length_is_validated() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![]));
            let app = state(provider.clone());

            let err = chat(State(app.clone()), Json(body("", None))).await.unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST);

            let long = "a".repeat(MAX_QUERY_CHARS + 1);
            let err = chat(State(app), Json(body(&long, None))).await.unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST);
            assert!(provider.requests().is_empty());
        });
    }

    #[test]
    fn test_chat_updates_session_history() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![
                answer("Sinner is number one."),
                answer("He is Italian."),
            ]));
            let app = state(provider.clone());

            let Json(reply) = chat(State(app.clone()), Json(body("who is number one?", Some("s1"))))
                .await
                .unwrap();
            assert_eq!(reply.response, "Sinner is number one.");

            chat(State(app.clone()), Json(body("where is he from?", Some("s1"))))
                .await
                .unwrap();
            let second = &provider.requests()[1];
            let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
            assert_eq!(
                roles,
                vec![Role::System, Role::User, Role::Model, Role::User]
            );
            assert_eq!(app.sessions.get_history("s1").await.len(), 4);
        });
    }

    #[test]
    fn test_request_history_used_without_session() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![answer("ok")]));
            let app = state(provider.clone());
            let mut request = body("and now?", None);
            request.history = Some(vec![ConversationMessage::user("earlier")]);

            chat(State(app), Json(request)).await.unwrap();
            assert_eq!(provider.requests()[0].messages[1].content, "earlier");
        });
    }

    #[test]
    fn test_clear_history() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![]));
            let app = state(provider);
            app.sessions.update_history("s1", "q", "a").await;

            let status = clear_history(State(app.clone()), Path("s1".to_string())).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
            assert!(app.sessions.get_history("s1").await.is_empty());
        });
    }

    #[test]
    fn test_stream_emits_fragments_and_records_answer() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![answer("Straight answer.")]));
            let app = state(provider);

            let sse = chat_stream(State(app.clone()), Json(body("q", Some("s2"))))
                .await
                .unwrap_or_else(|_| panic!("stream request rejected"));
            let bytes = axum::body::to_bytes(sse.into_response().into_body(), usize::MAX)
                .await
                .unwrap();
            let text = String::from_utf8(bytes.to_vec()).unwrap();
            assert!(text.contains("data: Straight answer."));

            let history = app.sessions.get_history("s2").await;
            assert_eq!(history[1].content, "Straight answer.");
        });
    }

    #[test]
    fn test_stream_normalizes_carriage_returns() {
        rt().block_on(async {
            let provider = Arc::new(ScriptedProvider::new(vec![answer("Line one.\r\nLine two.\rEnd")]));
            let app = state(provider);

            let sse = chat_stream(State(app.clone()), Json(body("q", Some("s3"))))
                .await
                .unwrap_or_else(|_| panic!("stream request rejected"));
            let bytes = axum::body::to_bytes(sse.into_response().into_body(), usize::MAX)
                .await
                .unwrap();
            let text = String::from_utf8(bytes.to_vec()).unwrap();
            assert!(!text.contains('\r'));
            assert!(text.contains("data: Line two."));

            let history = app.sessions.get_history("s3").await;
            assert_eq!(history[1].content, "Line one.\r\nLine two.\rEnd");
        });
    }

    #[test]
    fn test_sse_data_line_breaks() {
        assert_eq!(sse_data("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }
}

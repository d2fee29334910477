//! In-process stub of the hosted backend for integration tests.
//!
//! Emulates just enough of the three sub-services: the row API (eq filters,
//! one order key, limit/offset, Content-Range totals), the identity service
//! (password grant, OTP issue/verify, user introspection, logout, recovery)
//! and the realtime websocket (phx_join/phx_leave/heartbeat plus change
//! frames for joined topics).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const VALID_EMAIL: &str = "admin@example.com";
pub const VALID_PASSWORD: &str = "password123";
pub const VALID_OTP: &str = "123456";

const STUB_USER_ID: &str = "7b6ff08a-93b4-4da5-a6f0-bb1e38f8a5d0";

#[derive(Clone)]
struct StubState {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    tokens: Arc<Mutex<HashSet<String>>>,
    changes: broadcast::Sender<Value>,
}

/// Handle to a running stub backend.
pub struct StubBackend {
    pub addr: SocketAddr,
    state: StubState,
}

impl StubBackend {
    pub async fn spawn() -> Self {
        let state = StubState {
            tables: Arc::new(Mutex::new(HashMap::new())),
            tokens: Arc::new(Mutex::new(HashSet::new())),
            changes: broadcast::channel(64).0,
        };

        let app = Router::new()
            .route("/rest/v1/:table", get(rest_list).post(rest_insert).patch(rest_update).delete(rest_delete))
            .route("/auth/v1/token", post(auth_token))
            .route("/auth/v1/otp", post(auth_otp))
            .route("/auth/v1/verify", post(auth_verify))
            .route("/auth/v1/user", get(auth_user))
            .route("/auth/v1/logout", post(auth_logout))
            .route("/auth/v1/recover", post(auth_recover))
            .route("/auth/v1/health", get(auth_health))
            .route("/realtime/v1/websocket", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub backend should bind");
        let addr = listener.local_addr().expect("stub backend has an address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub backend serves");
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Mint an access token the stub will vouch for (federated-login tests).
    pub fn issue_token(&self) -> String {
        let token = format!("issued-{}", Uuid::new_v4());
        self.state
            .tokens
            .lock()
            .expect("stub lock poisoned")
            .insert(token.clone());
        token
    }

    /// Forget every issued token; cached sessions become invalid upstream.
    pub fn revoke_all_tokens(&self) {
        self.state
            .tokens
            .lock()
            .expect("stub lock poisoned")
            .clear();
    }

    /// Push a change frame onto the realtime feed directly.
    pub fn emit(&self, table: &str, kind: &str, record: Value, old_record: Option<Value>) {
        emit_change(&self.state, table, kind, record, old_record);
    }

    /// Rows currently stored for a table.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .tables
            .lock()
            .expect("stub lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn emit_change(state: &StubState, table: &str, kind: &str, record: Value, old_record: Option<Value>) {
    let frame = json!({
        "topic": format!("realtime:public:{}", table),
        "event": kind,
        "payload": {
            "record": record,
            "old_record": old_record,
        },
        "ref": null,
    });
    let _ = state.changes.send(frame);
}

// ============================================================================
// Row API
// ============================================================================

struct ListQuery {
    filters: Vec<(String, String)>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
    offset: usize,
}

fn parse_list_query(raw: &str) -> ListQuery {
    let mut query = ListQuery {
        filters: Vec::new(),
        order: None,
        limit: None,
        offset: 0,
    };
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "select" => {}
            "order" => {
                let first = value.split(',').next().unwrap_or_default();
                let descending = first.ends_with(".desc");
                let field = first
                    .trim_end_matches(".desc")
                    .trim_end_matches(".asc")
                    .to_string();
                query.order = Some((field, descending));
            }
            "limit" => query.limit = value.parse().ok(),
            "offset" => query.offset = value.parse().unwrap_or(0),
            field => {
                if let Some(rest) = value.strip_prefix("eq.") {
                    query.filters.push((field.to_string(), rest.to_string()));
                }
            }
        }
    }
    query
}

fn field_text(row: &Value, field: &str) -> String {
    match row.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn matching_rows(rows: &[Value], filters: &[(String, String)]) -> Vec<Value> {
    rows.iter()
        .filter(|row| {
            filters
                .iter()
                .all(|(field, value)| &field_text(row, field) == value)
        })
        .cloned()
        .collect()
}

async fn rest_list(
    State(state): State<StubState>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = parse_list_query(raw.as_deref().unwrap_or(""));
    let tables = state.tables.lock().expect("stub lock poisoned");
    let rows = tables.get(&table).cloned().unwrap_or_default();
    drop(tables);

    let mut matched = matching_rows(&rows, &query.filters);
    if let Some((field, descending)) = &query.order {
        matched.sort_by_key(|row| field_text(row, field));
        if *descending {
            matched.reverse();
        }
    }

    let total = matched.len();
    let page: Vec<Value> = matched
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    let content_range = if page.is_empty() {
        format!("*/{}", total)
    } else {
        format!(
            "{}-{}/{}",
            query.offset,
            query.offset + page.len() - 1,
            total
        )
    };

    (
        AppendHeaders([(header::CONTENT_RANGE, content_range)]),
        Json(page),
    )
        .into_response()
}

async fn rest_insert(
    State(state): State<StubState>,
    Path(table): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let Value::Object(mut row) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "expected a row object"})),
        )
            .into_response();
    };
    row.insert("id".into(), json!(Uuid::new_v4().to_string()));
    row.insert("created_at".into(), json!(chrono::Utc::now()));
    let row = Value::Object(row);

    state
        .tables
        .lock()
        .expect("stub lock poisoned")
        .entry(table.clone())
        .or_default()
        .push(row.clone());
    emit_change(&state, &table, "INSERT", row.clone(), None);

    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

async fn rest_update(
    State(state): State<StubState>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
    Json(payload): Json<Value>,
) -> Response {
    let query = parse_list_query(raw.as_deref().unwrap_or(""));
    let mut tables = state.tables.lock().expect("stub lock poisoned");
    let rows = tables.entry(table.clone()).or_default();

    let mut updated: Vec<Value> = Vec::new();
    for row in rows.iter_mut() {
        let matches = query
            .filters
            .iter()
            .all(|(field, value)| &field_text(row, field) == value);
        if !matches {
            continue;
        }
        let old = row.clone();
        if let (Value::Object(target), Value::Object(changes)) = (&mut *row, &payload) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
            target.insert("updated_at".into(), json!(chrono::Utc::now()));
        }
        updated.push(row.clone());
        emit_change(&state, &table, "UPDATE", row.clone(), Some(old));
    }

    Json(json!(updated)).into_response()
}

async fn rest_delete(
    State(state): State<StubState>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = parse_list_query(raw.as_deref().unwrap_or(""));
    let mut tables = state.tables.lock().expect("stub lock poisoned");
    let rows = tables.entry(table.clone()).or_default();

    let (removed, kept): (Vec<Value>, Vec<Value>) = rows.drain(..).partition(|row| {
        query
            .filters
            .iter()
            .all(|(field, value)| &field_text(row, field) == value)
    });
    *rows = kept;
    drop(tables);

    for row in &removed {
        emit_change(&state, &table, "DELETE", Value::Null, Some(row.clone()));
    }

    Json(json!(removed)).into_response()
}

// ============================================================================
// Identity service
// ============================================================================

fn stub_user() -> Value {
    json!({
        "id": STUB_USER_ID,
        "email": VALID_EMAIL,
        "phone": "+15555550100",
        "role": "authenticated",
    })
}

fn issue_session(state: &StubState) -> Value {
    let access_token = format!("issued-{}", Uuid::new_v4());
    state
        .tokens
        .lock()
        .expect("stub lock poisoned")
        .insert(access_token.clone());
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("refresh-{}", Uuid::new_v4()),
        "user": stub_user(),
    })
}

async fn auth_token(
    State(state): State<StubState>,
    RawQuery(raw): RawQuery,
    Json(body): Json<Value>,
) -> Response {
    let grant_type = url::form_urlencoded::parse(raw.as_deref().unwrap_or("").as_bytes())
        .find(|(k, _)| k == "grant_type")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    match grant_type.as_str() {
        "password" => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            if email == VALID_EMAIL && password == VALID_PASSWORD {
                Json(issue_session(&state)).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Invalid login credentials",
                    })),
                )
                    .into_response()
            }
        }
        "refresh_token" => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            if refresh.starts_with("refresh-") {
                Json(issue_session(&state)).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Invalid Refresh Token",
                    })),
                )
                    .into_response()
            }
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error_description": format!("unsupported grant type: {}", other)})),
        )
            .into_response(),
    }
}

async fn auth_otp(Json(body): Json<Value>) -> Response {
    if body["phone"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"msg": "phone is required"})),
        )
            .into_response();
    }
    Json(json!({})).into_response()
}

async fn auth_verify(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    if body["token"].as_str() == Some(VALID_OTP) {
        Json(issue_session(&state)).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"msg": "Token has expired or is invalid"})),
        )
            .into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

async fn auth_user(State(state): State<StubState>, headers: HeaderMap) -> Response {
    let known = bearer_token(&headers)
        .map(|token| {
            state
                .tokens
                .lock()
                .expect("stub lock poisoned")
                .contains(&token)
        })
        .unwrap_or(false);

    if known {
        Json(stub_user()).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"msg": "invalid JWT"})),
        )
            .into_response()
    }
}

async fn auth_logout(State(state): State<StubState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        state
            .tokens
            .lock()
            .expect("stub lock poisoned")
            .remove(&token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn auth_recover(Json(_body): Json<Value>) -> Response {
    Json(json!({})).into_response()
}

async fn auth_health() -> Response {
    Json(json!({"name": "stub", "description": "in-process identity service"})).into_response()
}

// ============================================================================
// Realtime websocket
// ============================================================================

async fn ws_upgrade(State(state): State<StubState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: StubState) {
    let mut changes = state.changes.subscribe();
    let mut joined: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let topic = frame["topic"].as_str().unwrap_or_default().to_string();
                        let msg_ref = frame["ref"].clone();
                        match frame["event"].as_str() {
                            Some("phx_join") => {
                                joined.insert(topic.clone());
                                if reply_ok(&mut socket, &topic, msg_ref).await.is_err() {
                                    break;
                                }
                            }
                            Some("phx_leave") => {
                                joined.remove(&topic);
                                if reply_ok(&mut socket, &topic, msg_ref).await.is_err() {
                                    break;
                                }
                            }
                            Some("heartbeat") => {
                                if reply_ok(&mut socket, "phoenix", msg_ref).await.is_err() {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            change = changes.recv() => {
                if let Ok(frame) = change {
                    let topic = frame["topic"].as_str().unwrap_or_default();
                    if joined.contains(topic)
                        && socket.send(Message::Text(frame.to_string())).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

async fn reply_ok(socket: &mut WebSocket, topic: &str, msg_ref: Value) -> Result<(), axum::Error> {
    let reply = json!({
        "topic": topic,
        "event": "phx_reply",
        "payload": {"status": "ok", "response": {}},
        "ref": msg_ref,
    });
    socket.send(Message::Text(reply.to_string())).await
}

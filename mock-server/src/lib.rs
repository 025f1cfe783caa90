//! In-memory stub of the REDCap API, used by core integration tests.
//!
//! REDCap exposes a single endpoint taking form-encoded POSTs where the
//! `content` field selects the operation. This stub implements the subset
//! the core client exercises — user export, record export/import/delete,
//! and file export/import — with REDCap's observable quirks preserved:
//! numeric permission flags serialized as JSON strings, HTTP 200 with an
//! empty list for a nonexistent record export, a 403 `{"error": ...}` body
//! for a bad token, and the attachment filename carried in the
//! Content-Type header's `name="..."` parameter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// One project user as Export Users returns it. Flags are strings because
/// that is how real REDCap servers serialize them.
#[derive(Clone, Debug, Serialize)]
pub struct MockUser {
    pub username: String,
    pub email: String,
    pub design: String,
    pub user_rights: String,
    pub data_export: String,
    pub api_export: String,
    pub api_import: String,
    pub record_create: String,
    pub record_delete: String,
}

impl MockUser {
    pub fn new(username: &str, data_export: &str) -> Self {
        Self {
            username: username.to_string(),
            email: format!("{username}@example.org"),
            design: "0".to_string(),
            user_rights: "0".to_string(),
            data_export: data_export.to_string(),
            api_export: "1".to_string(),
            api_import: "1".to_string(),
            record_create: "1".to_string(),
            record_delete: "1".to_string(),
        }
    }

    /// A user with Full Data Set export access.
    pub fn full_access(username: &str) -> Self {
        Self::new(username, "1")
    }

    /// A user limited to de-identified exports.
    pub fn deidentified(username: &str) -> Self {
        Self::new(username, "2")
    }
}

/// Configuration for one stubbed project.
#[derive(Clone, Debug)]
pub struct MockProject {
    pub token: String,
    pub id_field: String,
    pub users: Vec<MockUser>,
    /// Artificial latency before every response, for deadline tests.
    pub response_delay: Option<Duration>,
}

impl Default for MockProject {
    fn default() -> Self {
        Self {
            token: "ABC123".to_string(),
            id_field: "record_id".to_string(),
            users: vec![MockUser::full_access("alice")],
            response_delay: None,
        }
    }
}

type Row = Map<String, Value>;

#[derive(Clone)]
struct StoredFile {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

struct ProjectState {
    config: MockProject,
    records: Vec<Row>,
    files: HashMap<(String, String), StoredFile>,
}

type Db = Arc<RwLock<ProjectState>>;

pub fn app(config: MockProject) -> Router {
    let db: Db = Arc::new(RwLock::new(ProjectState {
        config,
        records: Vec::new(),
        files: HashMap::new(),
    }));
    Router::new().route("/", post(api)).with_state(db)
}

pub async fn run(listener: TcpListener, config: MockProject) -> Result<(), std::io::Error> {
    axum::serve(listener, app(config)).await
}

async fn api(State(db): State<Db>, req: Request) -> Response {
    let delay = db.read().await.config.response_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let (params, file) = match read_request(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let mut state = db.write().await;
    if params.get("token") != Some(&state.config.token) {
        return api_error(
            StatusCode::FORBIDDEN,
            "You do not have permissions to use the API",
        );
    }

    let content = params.get("content").map(String::as_str).unwrap_or("");
    let action = params.get("action").map(String::as_str);
    match (content, action) {
        ("user", _) => export_users(&state),
        ("record", Some("delete")) => delete_record(&mut state, &params),
        ("record", _) if params.contains_key("data") => import_records(&mut state, &params),
        ("record", _) => export_records(&state, &params),
        ("file", Some("export")) => export_file(&state, &params),
        ("file", Some("import")) => import_file(&mut state, &params, file),
        _ => api_error(
            StatusCode::BAD_REQUEST,
            "The value of the parameter \"content\" is not valid",
        ),
    }
}

/// Decode either a urlencoded or a multipart POST body into form fields
/// plus an optional uploaded file.
async fn read_request(
    req: Request,
) -> Result<(HashMap<String, String>, Option<StoredFile>), Response> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "malformed multipart body"))?;
        let mut params = HashMap::new();
        let mut file = None;
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(_) => {
                    return Err(api_error(StatusCode::BAD_REQUEST, "malformed multipart body"))
                }
            };
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or("").to_string();
                let file_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| api_error(StatusCode::BAD_REQUEST, "unreadable file part"))?;
                file = Some(StoredFile {
                    filename,
                    content_type: file_type,
                    data: data.to_vec(),
                });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|_| api_error(StatusCode::BAD_REQUEST, "unreadable form field"))?;
                params.insert(name, text);
            }
        }
        Ok((params, file))
    } else {
        let bytes = axum::body::to_bytes(req.into_body(), 1 << 20)
            .await
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "unreadable body"))?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "malformed form body"))?;
        Ok((pairs.into_iter().collect(), None))
    }
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn export_users(state: &ProjectState) -> Response {
    Json(state.config.users.clone()).into_response()
}

fn export_records(state: &ProjectState, params: &HashMap<String, String>) -> Response {
    let id_field = &state.config.id_field;
    let mut rows: Vec<Row> = state.records.clone();
    if let Some(wanted) = params.get("records") {
        rows.retain(|row| field_text(row, id_field) == *wanted);
    }
    if let Some(fields) = params.get("fields") {
        let wanted: Vec<&str> = fields.split(',').collect();
        rows = rows
            .into_iter()
            .filter_map(|row| {
                let mut projected = Row::new();
                for field in &wanted {
                    if let Some(value) = row.get(*field) {
                        projected.insert((*field).to_string(), value.clone());
                    }
                }
                // REDCap omits records where every requested field is empty.
                let all_empty = projected.values().all(|v| match v {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                });
                if projected.is_empty() || all_empty {
                    None
                } else {
                    Some(projected)
                }
            })
            .collect();
    }
    Json(rows).into_response()
}

fn import_records(state: &mut ProjectState, params: &HashMap<String, String>) -> Response {
    let data = params.get("data").cloned().unwrap_or_default();
    let rows: Vec<Row> = match serde_json::from_str(&data) {
        Ok(rows) => rows,
        Err(_) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "Invalid JSON in the \"data\" parameter",
            )
        }
    };
    let id_field = state.config.id_field.clone();
    let mut ids = Vec::new();
    for row in rows {
        let id = field_text(&row, &id_field);
        if id.is_empty() {
            return api_error(
                StatusCode::BAD_REQUEST,
                &format!("The record id field ({id_field}) is missing"),
            );
        }
        match state
            .records
            .iter_mut()
            .find(|existing| field_text(existing, &id_field) == id)
        {
            Some(existing) => {
                for (key, value) in row {
                    existing.insert(key, value);
                }
            }
            None => state.records.push(row),
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Json(ids).into_response()
}

fn delete_record(state: &mut ProjectState, params: &HashMap<String, String>) -> Response {
    let Some(id) = params.get("records[0]") else {
        return api_error(StatusCode::BAD_REQUEST, "No record ids were provided");
    };
    let id_field = state.config.id_field.clone();
    let before = state.records.len();
    state.records.retain(|row| field_text(row, &id_field) != *id);
    let removed = before - state.records.len();
    if removed == 0 {
        return api_error(StatusCode::BAD_REQUEST, "The records provided do not exist");
    }
    state.files.retain(|(record, _), _| record != id);
    removed.to_string().into_response()
}

fn export_file(state: &ProjectState, params: &HashMap<String, String>) -> Response {
    let record = params.get("record").cloned().unwrap_or_default();
    let field = params.get("field").cloned().unwrap_or_default();
    match state.files.get(&(record, field)) {
        Some(file) => {
            let content_type = format!(
                "{}; name=\"{}\";charset=UTF-8",
                file.content_type, file.filename
            );
            ([(header::CONTENT_TYPE, content_type)], file.data.clone()).into_response()
        }
        None => api_error(
            StatusCode::BAD_REQUEST,
            "There is no file to download for this record or field",
        ),
    }
}

fn import_file(
    state: &mut ProjectState,
    params: &HashMap<String, String>,
    file: Option<StoredFile>,
) -> Response {
    let Some(file) = file else {
        return api_error(StatusCode::BAD_REQUEST, "No file was uploaded");
    };
    let record = params.get("record").cloned().unwrap_or_default();
    let field = params.get("field").cloned().unwrap_or_default();
    if record.is_empty() || field.is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "The record and field parameters are required",
        );
    }
    state.files.insert((record, field), file);
    // REDCap answers a successful file import with an empty body.
    StatusCode::OK.into_response()
}

fn field_text(row: &Row, field: &str) -> String {
    match row.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_user_serializes_flags_as_strings() {
        let json = serde_json::to_value(MockUser::full_access("alice")).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["data_export"], "1");
        assert_eq!(json["email"], "alice@example.org");
    }

    #[test]
    fn deidentified_user_has_export_level_two() {
        let json = serde_json::to_value(MockUser::deidentified("bob")).unwrap();
        assert_eq!(json["data_export"], "2");
    }

    #[test]
    fn default_project_has_one_full_access_user() {
        let project = MockProject::default();
        assert_eq!(project.users.len(), 1);
        assert_eq!(project.users[0].data_export, "1");
        assert_eq!(project.id_field, "record_id");
    }

    #[test]
    fn field_text_renders_strings_and_numbers() {
        let row: Row = serde_json::from_str(r#"{"a":"x","b":2}"#).unwrap();
        assert_eq!(field_text(&row, "a"), "x");
        assert_eq!(field_text(&row, "b"), "2");
        assert_eq!(field_text(&row, "c"), "");
    }
}

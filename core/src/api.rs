//! Stateless request builder and response parser for the REDCap API.
//!
//! # Design
//! `RedcapApi` holds a validated [`RedcapSpec`] and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an [`ApiRequest`] and a `parse_*` method that consumes an
//! [`ApiResponse`]; the transport layer executes the HTTP round-trip in
//! between, keeping everything here deterministic and testable without a
//! network.
//!
//! REDCap's API is a single endpoint: every operation POSTs the token plus
//! a `content` discriminator (`user`, `record`, `file`, ...) as form fields.

use serde_json::Value;

use crate::error::RedcapError;
use crate::http::{ApiRequest, ApiResponse, FilePart};
use crate::spec::RedcapSpec;
use crate::types::{AccessReport, Attachment, Record, UserRights};

/// Builds `ApiRequest` values and parses `ApiResponse` values for one
/// REDCap project, without touching the network.
#[derive(Debug, Clone)]
pub struct RedcapApi {
    spec: RedcapSpec,
}

impl RedcapApi {
    pub fn new(spec: RedcapSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &RedcapSpec {
        &self.spec
    }

    fn request(&self, form: Vec<(&str, String)>) -> ApiRequest {
        ApiRequest {
            url: self.spec.api_url().to_string(),
            form: form
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            file: None,
        }
    }

    // --- users / access -----------------------------------------------------

    /// Export all project users and their permission flags (`content=user`).
    pub fn build_export_users(&self) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "user".to_string()),
            ("format", "json".to_string()),
            ("type", "flat".to_string()),
        ])
    }

    /// # Errors
    /// [`RedcapError::Auth`] on 401/403, [`RedcapError::UnexpectedStatus`]
    /// on other non-200 statuses, [`RedcapError::Protocol`] when the body is
    /// not a user list.
    pub fn parse_export_users(&self, response: ApiResponse) -> Result<Vec<UserRights>, RedcapError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| RedcapError::Protocol(format!("cannot decode user export: {e}")))
    }

    /// Locate the spec's username in a user export.
    ///
    /// # Errors
    /// [`RedcapError::ConfigMismatch`] when the username is absent — the
    /// spec's `username` does not belong to this token's project, which
    /// would otherwise surface as a silent false negative.
    pub fn resolve_access(&self, users: Vec<UserRights>) -> Result<AccessReport, RedcapError> {
        let username = self.spec.username();
        users
            .into_iter()
            .find(|u| u.username == username)
            .map(|rights| AccessReport { rights })
            .ok_or_else(|| RedcapError::ConfigMismatch(username.to_string()))
    }

    // --- record export ------------------------------------------------------

    /// Export the full contents of a single record. A nonexistent record id
    /// comes back from REDCap as an empty result with HTTP 200.
    pub fn build_export_record(&self, record_id: &str) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "record".to_string()),
            ("format", "json".to_string()),
            ("type", "flat".to_string()),
            ("records", record_id.to_string()),
        ])
    }

    /// Export the entire dataset.
    pub fn build_export_all_records(&self) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "record".to_string()),
            ("format", "json".to_string()),
            ("type", "flat".to_string()),
        ])
    }

    /// Export only the named fields. REDCap omits records where every
    /// requested field is empty, so a single-field export can return fewer
    /// rows than the project has records.
    pub fn build_export_fields(&self, fields: &[&str]) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "record".to_string()),
            ("format", "json".to_string()),
            ("type", "flat".to_string()),
            ("fields", fields.join(",")),
        ])
    }

    /// # Errors
    /// Same taxonomy as [`RedcapApi::parse_export_users`].
    pub fn parse_export_records(&self, response: ApiResponse) -> Result<Vec<Record>, RedcapError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| RedcapError::Protocol(format!("cannot decode record export: {e}")))
    }

    // --- record import / mutation ------------------------------------------

    /// Add or update a batch of records. Each record must contain the
    /// project's record-id field or REDCap rejects the import.
    ///
    /// # Errors
    /// [`RedcapError::Protocol`] when the payload cannot be serialized.
    pub fn build_import_records(&self, records: &[Record]) -> Result<ApiRequest, RedcapError> {
        let data = serde_json::to_string(records)
            .map_err(|e| RedcapError::Protocol(format!("cannot encode import payload: {e}")))?;
        Ok(self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "record".to_string()),
            ("format", "json".to_string()),
            ("type", "flat".to_string()),
            ("overwriteBehavior", "normal".to_string()),
            ("forceAutoNumber", "false".to_string()),
            ("returnContent", "ids".to_string()),
            ("returnFormat", "json".to_string()),
            ("data", data),
        ]))
    }

    /// Overwrite one field on one record. The payload must be a one-element
    /// record list; REDCap answers 200 but takes no action on a bare object.
    /// Creates the record when `record_id` does not exist yet.
    ///
    /// # Errors
    /// See [`RedcapApi::build_import_records`].
    pub fn build_update_field(
        &self,
        id_field: &str,
        record_id: &str,
        field: &str,
        value: Value,
    ) -> Result<ApiRequest, RedcapError> {
        let mut row = Record::new();
        row.insert(id_field.to_string(), Value::String(record_id.to_string()));
        row.insert(field.to_string(), value);
        self.build_import_records(&[row])
    }

    /// Record ids affected by an import.
    ///
    /// # Errors
    /// Same taxonomy as [`RedcapApi::parse_export_users`].
    pub fn parse_import_records(&self, response: ApiResponse) -> Result<Vec<String>, RedcapError> {
        check_status(&response)?;
        let ids: Vec<Value> = serde_json::from_slice(&response.body)
            .map_err(|e| RedcapError::Protocol(format!("cannot decode import result: {e}")))?;
        Ok(ids
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect())
    }

    /// Delete one record (`action=delete`).
    pub fn build_delete_record(&self, record_id: &str) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "record".to_string()),
            ("action", "delete".to_string()),
            ("records[0]", record_id.to_string()),
        ])
    }

    /// Number of records deleted.
    ///
    /// # Errors
    /// Same taxonomy as [`RedcapApi::parse_export_users`].
    pub fn parse_delete_record(&self, response: ApiResponse) -> Result<u64, RedcapError> {
        check_status(&response)?;
        let text = response.text()?;
        text.trim()
            .parse()
            .map_err(|_| RedcapError::Protocol(format!("delete count is not a number: {text}")))
    }

    // --- attachments --------------------------------------------------------

    /// Download the file stored in a file-upload field.
    pub fn build_export_attachment(&self, record_id: &str, field: &str) -> ApiRequest {
        self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "file".to_string()),
            ("action", "export".to_string()),
            ("record", record_id.to_string()),
            ("field", field.to_string()),
        ])
    }

    /// The body is kept as raw bytes: REDCap may declare a charset the file
    /// does not actually use. The filename comes from the Content-Type
    /// header's `name="..."` parameter and is empty when absent.
    ///
    /// # Errors
    /// Same taxonomy as [`RedcapApi::parse_export_users`].
    pub fn parse_export_attachment(&self, response: ApiResponse) -> Result<Attachment, RedcapError> {
        check_status(&response)?;
        let filename = response
            .header("content-type")
            .map(parse_attachment_filename)
            .unwrap_or_default();
        Ok(Attachment {
            filename,
            bytes: response.body,
        })
    }

    /// Convert rows to CSV and attach the result to a record's file-upload
    /// field as a multipart import. The CSV is prefixed with a UTF-8 BOM so
    /// spreadsheet tools decode it correctly.
    pub fn build_attach_csv(
        &self,
        record_id: &str,
        field: &str,
        filename: &str,
        rows: &[Record],
    ) -> ApiRequest {
        let mut req = self.request(vec![
            ("token", self.spec.token().to_string()),
            ("content", "file".to_string()),
            ("action", "import".to_string()),
            ("record", record_id.to_string()),
            ("field", field.to_string()),
        ]);
        req.file = Some(FilePart {
            filename: filename.to_string(),
            content_type: "text/plain".to_string(),
            data: rows_to_csv(rows).into_bytes(),
        });
        req
    }

    /// REDCap returns an empty body on a successful file import.
    ///
    /// # Errors
    /// Same taxonomy as [`RedcapApi::parse_export_users`].
    pub fn parse_import_attachment(&self, response: ApiResponse) -> Result<(), RedcapError> {
        check_status(&response)
    }
}

/// Map non-200 statuses to the appropriate error. REDCap reports a rejected
/// token as 401/403 with an `{"error": "..."}` body.
fn check_status(response: &ApiResponse) -> Result<(), RedcapError> {
    if response.status == 200 {
        return Ok(());
    }
    let body = String::from_utf8_lossy(&response.body).into_owned();
    if response.status == 401 || response.status == 403 {
        let message = api_error_message(&body).unwrap_or(body);
        return Err(RedcapError::Auth {
            status: response.status,
            message,
        });
    }
    Err(RedcapError::UnexpectedStatus {
        status: response.status,
        body,
    })
}

/// Extract the message from an `{"error": "..."}` body, if that is what it is.
fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

/// Parse the filename out of a Content-Type header value such as
/// `text/plain; name="upload.csv";charset=UTF-8`. Empty when absent.
fn parse_attachment_filename(content_type: &str) -> String {
    for part in content_type.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("name=\"") {
            if let Some(end) = rest.find('"') {
                return rest[..end].to_string();
            }
        }
    }
    String::new()
}

/// Render rows as CSV with a UTF-8 BOM. The header is the sorted union of
/// all keys; missing values render as empty fields.
fn rows_to_csv(rows: &[Record]) -> String {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }
    headers.sort_unstable();

    let mut out = String::from("\u{feff}");
    out.push_str(&headers.iter().map(|h| csv_escape(h)).collect::<Vec<_>>().join(","));
    out.push_str("\r\n");
    for row in rows {
        let line: Vec<String> = headers
            .iter()
            .map(|h| csv_escape(&cell_text(row.get(*h))))
            .collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

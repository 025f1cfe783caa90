//! High-level asynchronous client: build, execute, parse.
//!
//! # Design
//! `RedcapClient` combines a [`RedcapApi`] with a [`Transport`] and exposes
//! one async method per operation. Record exports are gated on the token
//! holder having Full Data Set export access; imports, deletes, attachments,
//! and field updates are not. Nothing is cached between calls and no retry
//! is ever attempted — a call either succeeds or fails with one of the
//! [`RedcapError`] kinds, and callers gating privileged work must treat any
//! non-success as "do not proceed."

use serde_json::Value;
use tracing::debug;

use crate::api::RedcapApi;
use crate::error::RedcapError;
use crate::spec::RedcapSpec;
use crate::transport::{Transport, TransportConfig};
use crate::types::{AccessReport, Attachment, Record};

/// Asynchronous REDCap API client for one project.
#[derive(Debug, Clone)]
pub struct RedcapClient {
    api: RedcapApi,
    transport: Transport,
}

impl RedcapClient {
    /// Client with the default transport configuration.
    ///
    /// # Errors
    /// Returns [`RedcapError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(spec: RedcapSpec) -> Result<Self, RedcapError> {
        Ok(Self::with_transport(
            spec,
            Transport::new(TransportConfig::default())?,
        ))
    }

    /// Client with a caller-configured transport (custom timeouts or
    /// deadline).
    pub fn with_transport(spec: RedcapSpec, transport: Transport) -> Self {
        Self {
            api: RedcapApi::new(spec),
            transport,
        }
    }

    pub fn spec(&self) -> &RedcapSpec {
        self.api.spec()
    }

    /// Confirm that the spec's token is valid and resolve the spec's
    /// username to its permission flags. One outbound request; repeated
    /// calls with the same spec give the same result barring server-side
    /// permission changes.
    ///
    /// # Errors
    /// [`RedcapError::Transport`] when the server is unreachable,
    /// [`RedcapError::Auth`] when the token is rejected,
    /// [`RedcapError::ConfigMismatch`] when the username is not among the
    /// project's users, [`RedcapError::Protocol`] on an unparseable
    /// response, [`RedcapError::Cancelled`] on deadline expiry.
    pub async fn validate_access(&self) -> Result<AccessReport, RedcapError> {
        let request = self.api.build_export_users();
        let response = self.transport.execute(request).await?;
        let users = self.api.parse_export_users(response)?;
        debug!(users = users.len(), username = self.spec().username(), "resolving access");
        self.api.resolve_access(users)
    }

    /// Validation gate for record exports: the token's user must have Full
    /// Data Set export access.
    async fn ensure_full_export(&self) -> Result<(), RedcapError> {
        let report = self.validate_access().await?;
        if report.confirmed() {
            Ok(())
        } else {
            Err(RedcapError::InsufficientAccess {
                username: report.rights.username.clone(),
                access: report.rights.export_access(),
            })
        }
    }

    /// Export the full contents of one record. Can return several rows when
    /// the project has repeating instruments; a nonexistent record id gives
    /// an empty result.
    ///
    /// # Errors
    /// The [`RedcapClient::validate_access`] taxonomy, plus
    /// [`RedcapError::InsufficientAccess`] when the export gate fails.
    pub async fn export_record(&self, record_id: &str) -> Result<Vec<Record>, RedcapError> {
        self.ensure_full_export().await?;
        let response = self
            .transport
            .execute(self.api.build_export_record(record_id))
            .await?;
        self.api.parse_export_records(response)
    }

    /// Export the project's entire dataset.
    ///
    /// # Errors
    /// See [`RedcapClient::export_record`].
    pub async fn export_all_records(&self) -> Result<Vec<Record>, RedcapError> {
        self.ensure_full_export().await?;
        let response = self
            .transport
            .execute(self.api.build_export_all_records())
            .await?;
        self.api.parse_export_records(response)
    }

    /// Export only the named fields. Records where every requested field is
    /// empty are omitted by REDCap.
    ///
    /// # Errors
    /// See [`RedcapClient::export_record`].
    pub async fn export_fields(&self, fields: &[&str]) -> Result<Vec<Record>, RedcapError> {
        self.ensure_full_export().await?;
        let response = self
            .transport
            .execute(self.api.build_export_fields(fields))
            .await?;
        self.api.parse_export_records(response)
    }

    /// Max value of the record-id field, or `None` for an empty project.
    ///
    /// # Errors
    /// See [`RedcapClient::export_record`]; additionally
    /// [`RedcapError::Protocol`] when an id value is not numeric.
    pub async fn max_record_id(&self, id_field: &str) -> Result<Option<u64>, RedcapError> {
        let rows = self.export_fields(&[id_field]).await?;
        let mut max = None;
        for row in &rows {
            let id = record_id_number(id_field, row.get(id_field))?;
            max = Some(max.map_or(id, |m: u64| m.max(id)));
        }
        Ok(max)
    }

    /// Add or update a batch of records; returns the affected record ids.
    /// Each record must carry the project's record-id field.
    ///
    /// # Errors
    /// The [`RedcapClient::validate_access`] taxonomy minus
    /// `ConfigMismatch`; a missing record-id field surfaces as
    /// [`RedcapError::UnexpectedStatus`] from the server.
    pub async fn import_records(&self, records: &[Record]) -> Result<Vec<String>, RedcapError> {
        let request = self.api.build_import_records(records)?;
        let response = self.transport.execute(request).await?;
        self.api.parse_import_records(response)
    }

    /// Overwrite one field on one record, creating the record when the id
    /// does not exist yet. Returns the affected record ids.
    ///
    /// # Errors
    /// See [`RedcapClient::import_records`].
    pub async fn update_field(
        &self,
        id_field: &str,
        record_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Vec<String>, RedcapError> {
        let request = self
            .api
            .build_update_field(id_field, record_id, field, value)?;
        let response = self.transport.execute(request).await?;
        self.api.parse_import_records(response)
    }

    /// Delete one record; returns the number of records deleted.
    ///
    /// # Errors
    /// See [`RedcapClient::import_records`].
    pub async fn delete_record(&self, record_id: &str) -> Result<u64, RedcapError> {
        let response = self
            .transport
            .execute(self.api.build_delete_record(record_id))
            .await?;
        self.api.parse_delete_record(response)
    }

    /// Download the file stored in a record's file-upload field.
    ///
    /// # Errors
    /// See [`RedcapClient::import_records`].
    pub async fn export_attachment(
        &self,
        record_id: &str,
        field: &str,
    ) -> Result<Attachment, RedcapError> {
        let response = self
            .transport
            .execute(self.api.build_export_attachment(record_id, field))
            .await?;
        self.api.parse_export_attachment(response)
    }

    /// Convert rows to CSV and attach the result to a record's file-upload
    /// field.
    ///
    /// # Errors
    /// See [`RedcapClient::import_records`].
    pub async fn attach_csv(
        &self,
        record_id: &str,
        field: &str,
        filename: &str,
        rows: &[Record],
    ) -> Result<(), RedcapError> {
        let request = self.api.build_attach_csv(record_id, field, filename, rows);
        let response = self.transport.execute(request).await?;
        self.api.parse_import_attachment(response)
    }
}

fn record_id_number(id_field: &str, value: Option<&Value>) -> Result<u64, RedcapError> {
    match value {
        Some(Value::String(s)) => s.trim().parse().map_err(|_| {
            RedcapError::Protocol(format!("record id [{s}] in field [{id_field}] is not numeric"))
        }),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            RedcapError::Protocol(format!("record id [{n}] in field [{id_field}] is not a u64"))
        }),
        other => Err(RedcapError::Protocol(format!(
            "record id field [{id_field}] has non-id value {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_number_parses_string_and_numeric_ids() {
        assert_eq!(record_id_number("record_id", Some(&Value::from("12"))).unwrap(), 12);
        assert_eq!(record_id_number("record_id", Some(&Value::from(3u64))).unwrap(), 3);
    }

    #[test]
    fn record_id_number_rejects_non_numeric_values() {
        assert!(record_id_number("record_id", Some(&Value::from("abc"))).is_err());
        assert!(record_id_number("record_id", None).is_err());
        assert!(record_id_number("record_id", Some(&Value::from(-1))).is_err());
    }
}

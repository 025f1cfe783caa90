//! Domain DTOs for the REDCap API.
//!
//! # Design
//! Records are schema-less maps because every REDCap project defines its own
//! fields. `UserRights` keeps only the permission flags the library acts on;
//! REDCap adds fields to the user export over time, so unknown keys are
//! ignored rather than rejected. Numeric flags arrive as JSON strings from
//! real servers and as numbers from some tooling — both forms parse.

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

/// A REDCap record row. Repeating instruments can produce several rows for
/// one record id, which is why export operations return `Vec<Record>`.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// REDCap's Data Export privilege levels, as carried in the `data_export`
/// field of an Export Users result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAccess {
    NoAccess,
    FullDataSet,
    Deidentified,
    /// A level this library does not know about. Never treated as full
    /// access.
    Other(u8),
}

impl From<u8> for ExportAccess {
    fn from(level: u8) -> Self {
        match level {
            0 => Self::NoAccess,
            1 => Self::FullDataSet,
            2 => Self::Deidentified,
            other => Self::Other(other),
        }
    }
}

/// One entry of the user export: a project member and their permission
/// flags. Flags are 0/1 unless noted; absent flags default to 0.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRights {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub design: u8,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub user_rights: u8,
    /// Data Export level, see [`ExportAccess`].
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub data_export: u8,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub api_export: u8,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub api_import: u8,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub record_create: u8,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub record_delete: u8,
}

impl UserRights {
    pub fn export_access(&self) -> ExportAccess {
        ExportAccess::from(self.data_export)
    }
}

/// Outcome of access validation: the matched user's permission flags.
#[derive(Debug, Clone)]
pub struct AccessReport {
    pub rights: UserRights,
}

impl AccessReport {
    /// True exactly when the user's data-export level is Full Data Set.
    /// Callers gating privileged operations must treat anything else as
    /// "do not proceed."
    pub fn confirmed(&self) -> bool {
        self.rights.export_access() == ExportAccess::FullDataSet
    }
}

/// A file downloaded from a file-upload field. `filename` is parsed from
/// the response headers and may be empty when the server does not name the
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rights_parses_string_flags() {
        // Real REDCap servers serialize numeric flags as JSON strings.
        let user: UserRights = serde_json::from_str(
            r#"{"username":"alice","email":"alice@example.org","design":"1",
                "user_rights":"1","data_export":"1","api_export":"1",
                "api_import":"0","record_create":"1","record_delete":"0"}"#,
        )
        .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.data_export, 1);
        assert_eq!(user.export_access(), ExportAccess::FullDataSet);
    }

    #[test]
    fn user_rights_parses_numeric_flags() {
        let user: UserRights =
            serde_json::from_str(r#"{"username":"bob","data_export":2}"#).unwrap();
        assert_eq!(user.export_access(), ExportAccess::Deidentified);
    }

    #[test]
    fn missing_flags_default_to_no_access() {
        let user: UserRights = serde_json::from_str(r#"{"username":"carol"}"#).unwrap();
        assert_eq!(user.export_access(), ExportAccess::NoAccess);
        assert_eq!(user.email, "");
    }

    #[test]
    fn unknown_user_export_fields_are_ignored() {
        let user: UserRights = serde_json::from_str(
            r#"{"username":"alice","data_export":"1","mobile_app":"0","expiration":""}"#,
        )
        .unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn unknown_export_level_is_never_full_access() {
        assert_eq!(ExportAccess::from(7), ExportAccess::Other(7));
        let report = AccessReport {
            rights: serde_json::from_str(r#"{"username":"dave","data_export":"7"}"#).unwrap(),
        };
        assert!(!report.confirmed());
    }

    #[test]
    fn access_report_confirmed_only_for_full_data_set() {
        for (level, expected) in [(0u8, false), (1, true), (2, false)] {
            let report = AccessReport {
                rights: serde_json::from_str(&format!(
                    r#"{{"username":"alice","data_export":{level}}}"#
                ))
                .unwrap(),
            };
            assert_eq!(report.confirmed(), expected, "level {level}");
        }
    }
}

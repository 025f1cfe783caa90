//! Client library for the REDCap clinical-data-capture HTTP API.
//!
//! # Overview
//! A [`RedcapSpec`] names one REDCap project: the API endpoint, the
//! project-scoped token, and the username that owns the token. Everything
//! else is an operation against that spec — validating that the token's
//! user has Full Data Set export access, exporting and importing records,
//! moving file attachments, and decoding Data Entry Trigger payloads.
//!
//! # Design
//! - [`RedcapApi`] is stateless: each operation is split into `build_*`
//!   (produces an [`ApiRequest`]) and `parse_*` (consumes an
//!   [`ApiResponse`]), so the wire logic is deterministic and testable
//!   without a network.
//! - [`Transport`] executes requests with reqwest, honoring a
//!   caller-supplied deadline; [`RedcapClient`] drives build → execute →
//!   parse per operation.
//! - Record exports are gated on the spec's user holding Full Data Set
//!   export access, matching how REDCap tokens are administered; a wrong
//!   username in the spec surfaces as [`RedcapError::ConfigMismatch`], not
//!   a silent false negative.

pub mod api;
pub mod client;
pub mod det;
pub mod error;
pub mod http;
pub mod spec;
pub mod transport;
pub mod types;

pub use api::RedcapApi;
pub use client::RedcapClient;
pub use det::parse_det_payload;
pub use error::RedcapError;
pub use http::{ApiRequest, ApiResponse, FilePart};
pub use spec::RedcapSpec;
pub use transport::{Transport, TransportConfig};
pub use types::{AccessReport, Attachment, ExportAccess, Record, UserRights};

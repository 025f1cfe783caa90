//! Data Entry Trigger payload parsing.
//!
//! REDCap's DET feature POSTs an `application/x-www-form-urlencoded` body to
//! a configured endpoint whenever a record is saved. This decodes such a
//! payload into simple key-value pairs.

use std::collections::HashMap;

use url::form_urlencoded;

/// Decode a DET payload. Blank values are kept; when a key repeats, the
/// first occurrence wins.
pub fn parse_det_payload(payload: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in form_urlencoded::parse(payload.as_bytes()) {
        out.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_key_value_pairs() {
        let det = parse_det_payload("project_id=42&record=7&instrument=intake");
        assert_eq!(det["project_id"], "42");
        assert_eq!(det["record"], "7");
        assert_eq!(det["instrument"], "intake");
    }

    #[test]
    fn decodes_percent_and_plus_escapes() {
        let det = parse_det_payload("redcap_url=https%3A%2F%2Fexample.org%2F&note=a+b");
        assert_eq!(det["redcap_url"], "https://example.org/");
        assert_eq!(det["note"], "a b");
    }

    #[test]
    fn blank_values_are_kept() {
        let det = parse_det_payload("record=7&redcap_repeat_instance=");
        assert_eq!(det["redcap_repeat_instance"], "");
    }

    #[test]
    fn first_occurrence_wins_on_duplicate_keys() {
        let det = parse_det_payload("record=7&record=8");
        assert_eq!(det["record"], "7");
    }

    #[test]
    fn empty_payload_gives_empty_map() {
        assert!(parse_det_payload("").is_empty());
    }
}

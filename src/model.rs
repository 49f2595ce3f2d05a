//! # Content Model
//!
//! The input representation for document generation. The surrounding
//! application owns the records (projects, locations, issues, photos) and
//! hands the engine a plain tree of them per generation request; the engine
//! never mutates or stores it. Serde derives keep the shape stable across
//! the JSON boundary.
//!
//! Locations and issues carry the caller's record ids. Hit-region ids are
//! derived from them, which is what lets marks survive a regeneration.

use serde::{Deserialize, Serialize};

/// Everything needed to generate one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionContent {
    /// Project display name. Also feeds the generated filename.
    pub project_name: String,

    /// Labeled summary fields shown on the project card (owner, address,
    /// inspection date, ...).
    #[serde(default)]
    pub fields: Vec<LabeledField>,

    /// Locations in walk order. A location named "notes" always sorts last
    /// regardless of input order.
    #[serde(default)]
    pub locations: Vec<Location>,

    /// Optional branding image composited into the page header. A source
    /// that fails to decode degrades to a header without a logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// A label/value pair on the project card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledField {
    pub label: String,
    pub value: String,
}

/// One inspected location and its issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Caller-assigned stable record id.
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// A single issue within a location. The atomic layout unit: its
/// description never splits across a page break, though its photo grid may
/// flow row-by-row onto following pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Caller-assigned stable record id.
    pub id: u64,
    pub description: String,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

/// A photo attached to an issue.
///
/// `src` accepts a data URI, raw base64, or a file path: the same source
/// forms the photo loader understands. Remote URLs are not fetched by the
/// engine; the host resolves them to one of the supported forms first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Which document is being generated. Both kinds share one layout; the
/// kind selects the title band text and the filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocKind {
    /// The full walkthrough report.
    Report,
    /// The sign-off sheet the builder checks items off on.
    SignOff,
}

impl DocKind {
    /// Title shown in the page header band.
    pub fn title(&self) -> &'static str {
        match self {
            DocKind::Report => "Walkthrough Report",
            DocKind::SignOff => "Sign-Off Sheet",
        }
    }

    /// Suffix used in the generated filename.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            DocKind::Report => "report",
            DocKind::SignOff => "signoff",
        }
    }
}

/// The name that pins a location to the end of the walk order.
pub const NOTES_LOCATION: &str = "notes";

/// Returns the locations in layout order: input order preserved, except
/// any location named "notes" (case-insensitive) sorts last.
pub fn ordered_locations(content: &InspectionContent) -> Vec<&Location> {
    let mut ordered: Vec<&Location> = content.locations.iter().collect();
    ordered.sort_by_key(|loc| loc.name.trim().eq_ignore_ascii_case(NOTES_LOCATION));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(id: u64, name: &str) -> Location {
        Location {
            id,
            name: name.to_string(),
            issues: vec![],
        }
    }

    #[test]
    fn notes_location_sorts_last() {
        let content = InspectionContent {
            project_name: "Test".to_string(),
            fields: vec![],
            locations: vec![loc(1, "Notes"), loc(2, "Kitchen"), loc(3, "Garage")],
            logo: None,
        };
        let ordered = ordered_locations(&content);
        let names: Vec<&str> = ordered.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Kitchen", "Garage", "Notes"]);
    }

    #[test]
    fn ordering_is_stable_without_notes() {
        let content = InspectionContent {
            project_name: "Test".to_string(),
            fields: vec![],
            locations: vec![loc(1, "Kitchen"), loc(2, "Garage"), loc(3, "Basement")],
            logo: None,
        };
        let ordered = ordered_locations(&content);
        let ids: Vec<u64> = ordered.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn content_round_trips_through_json() {
        let json = r#"{
            "projectName": "Lot 42",
            "fields": [{"label": "Owner", "value": "Smith"}],
            "locations": [
                {"id": 7, "name": "Kitchen", "issues": [
                    {"id": 70, "description": "Scratched counter", "photos": [
                        {"src": "photo-data", "caption": "close-up"}
                    ]}
                ]}
            ]
        }"#;
        let content: InspectionContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.locations[0].issues[0].id, 70);
        let back = serde_json::to_string(&content).unwrap();
        let again: InspectionContent = serde_json::from_str(&back).unwrap();
        assert_eq!(again.project_name, "Lot 42");
    }
}

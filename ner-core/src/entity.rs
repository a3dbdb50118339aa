//! Labeled entity spans and the organization selection policy.

use serde::{Deserialize, Serialize};

/// Labels that denote an organization. spaCy emits `ORG`, other taggers
/// spell it out.
const ORGANIZATION_LABELS: [&str; 2] = ["ORG", "ORGANIZATION"];

/// A contiguous piece of the input text tagged with an entity category.
///
/// Lives for the duration of one request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub label: String,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }

    pub fn is_organization(&self) -> bool {
        is_organization_label(&self.label)
    }
}

/// Whether `label` denotes an organization (ASCII case-insensitive).
pub fn is_organization_label(label: &str) -> bool {
    ORGANIZATION_LABELS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(label))
}

/// Text of the first organization span in sequence order.
///
/// First match wins; later organizations are ignored.
pub fn find_first_organization<'a, I>(spans: I) -> Option<String>
where
    I: IntoIterator<Item = &'a EntitySpan>,
{
    spans
        .into_iter()
        .find(|span| span.is_organization())
        .map(|span| span.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organization_labels() {
        assert!(is_organization_label("ORG"));
        assert!(is_organization_label("ORGANIZATION"));
        assert!(is_organization_label("org"));
        assert!(is_organization_label("Organization"));
        assert!(!is_organization_label("PERSON"));
        assert!(!is_organization_label("GPE"));
        assert!(!is_organization_label("ORGS"));
        assert!(!is_organization_label(""));
    }

    #[test]
    fn test_first_organization_wins() {
        let spans = vec![
            EntitySpan::new("Alice", "PERSON"),
            EntitySpan::new("Globex", "ORG"),
            EntitySpan::new("Paris", "GPE"),
            EntitySpan::new("Initech", "ORG"),
        ];
        assert_eq!(find_first_organization(&spans), Some("Globex".to_string()));
    }

    #[test]
    fn test_no_organization() {
        let spans = vec![
            EntitySpan::new("Alice", "PERSON"),
            EntitySpan::new("Tuesday", "DATE"),
        ];
        assert_eq!(find_first_organization(&spans), None);
        assert_eq!(find_first_organization(&[]), None);
    }

    #[test]
    fn test_span_serialization() {
        let span: EntitySpan =
            serde_json::from_str(r#"{"text": "Acme Corp", "label": "ORG"}"#).unwrap();
        assert_eq!(span, EntitySpan::new("Acme Corp", "ORG"));
    }
}

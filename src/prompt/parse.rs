use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FALLBACK_SUMMARY: &str = "No summary available";
const MAX_KEY_POINTS: usize = 5;

/// Normalized analysis of one email. Every field always carries a value,
/// even when the model response could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub importance: Importance,
    pub useful: bool,
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_required: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    #[serde(rename = "Very Important")]
    VeryImportant,
    Important,
    Normal,
    #[serde(rename = "Not Wanted")]
    NotWanted,
}

impl Importance {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Very Important" => Some(Importance::VeryImportant),
            "Important" => Some(Importance::Important),
            "Normal" => Some(Importance::Normal),
            "Not Wanted" => Some(Importance::NotWanted),
            _ => None,
        }
    }
}

/// Greedy bracket match: everything from the first `{` to the last `}`.
/// Model replies routinely wrap the JSON in prose or markdown fences, so
/// the candidate is cut out before strict parsing.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Turns raw model output into a fully-populated analysis. Never fails:
/// anything that does not contain a parseable JSON object degrades to the
/// deterministic fallback carrying the trimmed raw text as the summary.
pub fn parse_analysis(raw: &str) -> EmailAnalysis {
    extract_json_object(raw)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate.trim()).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(normalize_analysis(&map)),
            _ => None,
        })
        .unwrap_or_else(|| fallback_analysis(raw))
}

fn normalize_analysis(fields: &serde_json::Map<String, Value>) -> EmailAnalysis {
    let importance = fields
        .get("importance")
        .and_then(Value::as_str)
        .and_then(Importance::from_label)
        .unwrap_or(Importance::Normal);

    let useful = fields
        .get("useful")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let summary = fields
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_SUMMARY)
        .to_string();

    let key_points = fields
        .get("key_points")
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .filter_map(Value::as_str)
                .take(MAX_KEY_POINTS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let action_required = fields
        .get("action_required")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    EmailAnalysis {
        importance,
        useful,
        summary,
        key_points,
        action_required,
    }
}

fn fallback_analysis(raw: &str) -> EmailAnalysis {
    EmailAnalysis {
        importance: Importance::Normal,
        useful: true,
        summary: raw.trim().to_string(),
        key_points: Vec::new(),
        action_required: String::new(),
    }
}

/// Array-shaped responses (action items, reply suggestions) pass through
/// unvalidated beyond being a JSON array; any failure yields an empty list.
pub fn parse_list(raw: &str) -> Vec<Value> {
    extract_json_array(raw)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate.trim()).ok())
        .and_then(|value| match value {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_object_embedded_in_prose() {
        let raw = "Sure! {\"importance\":\"Important\",\"useful\":true,\"summary\":\"Invoice due Friday.\",\"key_points\":[\"Payment due Friday\"],\"action_required\":\"Pay invoice\"} Thanks.";

        let analysis = parse_analysis(raw);
        assert_eq!(analysis.importance, Importance::Important);
        assert!(analysis.useful);
        assert_eq!(analysis.summary, "Invoice due Friday.");
        assert_eq!(analysis.key_points, vec!["Payment due Friday"]);
        assert_eq!(analysis.action_required, "Pay invoice");
    }

    #[test]
    fn extracts_object_inside_markdown_fence() {
        let raw = "```json\n{\"importance\":\"Normal\",\"useful\":false,\"summary\":\"Promo.\",\"key_points\":[],\"action_required\":\"\"}\n```";
        let analysis = parse_analysis(raw);
        assert!(!analysis.useful);
        assert_eq!(analysis.summary, "Promo.");
    }

    #[test]
    fn no_brackets_yields_exact_fallback() {
        let raw = "  This email is about an invoice.  ";
        let analysis = parse_analysis(raw);
        assert_eq!(
            analysis,
            EmailAnalysis {
                importance: Importance::Normal,
                useful: true,
                summary: "This email is about an invoice.".to_string(),
                key_points: vec![],
                action_required: String::new(),
            }
        );
    }

    #[test]
    fn invalid_json_between_brackets_yields_fallback() {
        let raw = "{ this is not json }";
        let analysis = parse_analysis(raw);
        assert_eq!(analysis.importance, Importance::Normal);
        assert_eq!(analysis.summary, "{ this is not json }");
    }

    #[test]
    fn missing_and_mistyped_fields_get_defaults() {
        let raw = json!({
            "importance": "Critical",
            "useful": "yes",
            "key_points": "none",
        })
        .to_string();

        let analysis = parse_analysis(&raw);
        assert_eq!(analysis.importance, Importance::Normal);
        assert!(analysis.useful);
        assert_eq!(analysis.summary, FALLBACK_SUMMARY);
        assert!(analysis.key_points.is_empty());
        assert_eq!(analysis.action_required, "");
    }

    #[test]
    fn key_points_are_capped_at_five() {
        let raw = json!({
            "summary": "s",
            "key_points": ["1", "2", "3", "4", "5", "6", "7"],
        })
        .to_string();

        assert_eq!(parse_analysis(&raw).key_points.len(), 5);
    }

    #[test]
    fn top_level_array_is_not_an_analysis() {
        let analysis = parse_analysis("[1, 2, 3] and also {\"summary\": \"s\"}");
        // The object match spans from `{`, so this still parses the object.
        assert_eq!(analysis.summary, "s");

        let array_only = parse_analysis("[1, 2, 3]");
        assert_eq!(array_only.summary, "[1, 2, 3]");
    }

    #[test]
    fn importance_labels_round_trip_serde() {
        let analysis = parse_analysis(
            "{\"importance\":\"Very Important\",\"useful\":true,\"summary\":\"s\",\"key_points\":[],\"action_required\":\"\"}",
        );
        let serialized = serde_json::to_value(&analysis).unwrap();
        assert_eq!(serialized["importance"], "Very Important");
    }

    #[test]
    fn parse_list_passes_arrays_through() {
        let raw = "Here you go: [{\"action\":\"Pay invoice\",\"priority\":\"High\"}] done";
        let items = parse_list(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["action"], "Pay invoice");
    }

    #[test]
    fn parse_list_failure_is_empty() {
        assert!(parse_list("no array here").is_empty());
        assert!(parse_list("[ broken").is_empty());
        assert!(parse_list("{\"not\": \"an array\"}").is_empty());
    }
}

use serde::Deserialize;
use serde_json::Value;

use super::types::{AnalysisFields, Finding, FollowUp};

/// Parse a model answer into fields.
///
/// Accepts a ```json fenced block, a bare JSON object, or JSON embedded in
/// prose. Anything else is kept as a summary-only result.
pub fn parse_analysis_answer(answer: &str) -> AnalysisFields {
    match extract_json_object(answer).and_then(|json| parse_fields_json(&json)) {
        Some(fields) => fields,
        None => AnalysisFields::summary_only(answer),
    }
}

fn extract_json_object(answer: &str) -> Option<String> {
    if let Some(start) = answer.find("```json") {
        let content_start = start + 7;
        let end = answer[content_start..].find("```")?;
        return Some(answer[content_start..content_start + end].trim().to_string());
    }

    let trimmed = answer.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let open = answer.find('{')?;
    let close = answer.rfind('}')?;
    (close > open).then(|| answer[open..=close].to_string())
}

fn parse_fields_json(json_str: &str) -> Option<AnalysisFields> {
    #[derive(Deserialize)]
    struct RawAnswer {
        summary: Option<String>,
        document_type: Option<String>,
        findings: Option<Vec<Value>>,
        follow_up: Option<Vec<Value>>,
    }

    let raw: RawAnswer = serde_json::from_str(json_str).ok()?;

    Some(AnalysisFields {
        summary: raw.summary.unwrap_or_default().trim().to_string(),
        findings: parse_array_lenient::<Finding>(raw.findings.as_deref())
            .into_iter()
            .filter(|f| !f.label.trim().is_empty())
            .collect(),
        follow_up: parse_array_lenient::<FollowUp>(raw.follow_up.as_deref()),
        document_type: raw.document_type.filter(|t| !t.trim().is_empty()),
    })
}

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: Option<&[Value]>) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::types::FollowUpKind;

    const FENCED: &str = r#"Ecco l'analisi:

```json
{
  "summary": "Glicemia nella norma, colesterolo elevato.",
  "document_type": "laboratorio",
  "findings": [
    {"label": "Glucosio", "value": "95", "unit": "mg/dL", "reference_range": "70-110", "abnormal": false},
    {"label": "Colesterolo totale", "value": "245", "unit": "mg/dL", "reference_range": "<200", "abnormal": true},
    {"value": "no label"}
  ],
  "follow_up": [{"kind": "recheck", "note": "ripetere tra 3 mesi"}]
}
```
"#;

    #[test]
    fn parses_fenced_block() {
        let fields = parse_analysis_answer(FENCED);
        assert_eq!(fields.summary, "Glicemia nella norma, colesterolo elevato.");
        assert_eq!(fields.document_type.as_deref(), Some("laboratorio"));
        assert_eq!(fields.findings.len(), 2);
        assert_eq!(fields.abnormal_findings().count(), 1);
        assert_eq!(fields.follow_up[0].kind, FollowUpKind::Recheck);
    }

    #[test]
    fn parses_bare_object() {
        let fields = parse_analysis_answer(r#"{"summary": "ok", "findings": []}"#);
        assert_eq!(fields.summary, "ok");
        assert!(fields.findings.is_empty());
        assert!(fields.follow_up.is_empty());
    }

    #[test]
    fn parses_object_inside_prose() {
        let fields = parse_analysis_answer(r#"Risultato: {"summary": "breve"} fine."#);
        assert_eq!(fields.summary, "breve");
    }

    #[test]
    fn free_text_degrades_to_summary() {
        let fields = parse_analysis_answer("  Il referto non mostra alterazioni.  ");
        assert_eq!(fields.summary, "Il referto non mostra alterazioni.");
        assert!(fields.findings.is_empty());
        assert!(fields.document_type.is_none());
    }

    #[test]
    fn malformed_json_degrades_to_summary() {
        let fields = parse_analysis_answer("```json\n{\"summary\": \n```");
        assert!(fields.summary.contains("summary"));
        assert!(fields.findings.is_empty());
    }
}

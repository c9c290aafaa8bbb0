use crate::models::enums::DocumentType;

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"
You are a clinical summarization assistant for Italian medical reports
(referti). The text you receive has been de-identified: placeholders such as
[NOME], [CF], [INDIRIZZO], [TELEFONO], [DATA_NASCITA], [EMAIL] and [DATO]
stand for removed personal data.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Use ONLY information explicitly present in the document.
2. NEVER try to reconstruct or guess the content of a placeholder.
3. NEVER give a diagnosis or treatment advice; describe what the report says.
4. Preserve values and units verbatim.
5. Mark a finding abnormal only when the report flags it or the value lies
   outside the reported reference range.
6. Write the summary in Italian.

OUTPUT FORMAT:
A single JSON object wrapped in ```json``` fences and nothing else.
"#;

/// Build the analysis prompt for one redacted document.
pub fn build_analysis_prompt(redacted_text: &str, document_type: Option<DocumentType>) -> String {
    let type_note = match document_type {
        Some(t) => format!("The document is filed as: {}.\n", t.label()),
        None => String::new(),
    };

    format!(
        r#"{type_note}
<document>
{redacted_text}
</document>

Summarize the above report into the following JSON structure.

```json
{{
  "summary": "short summary in Italian",
  "document_type": "laboratorio | pronto_soccorso | dimissione | specialistica | altro",
  "findings": [
    {{
      "label": "test or observation name",
      "value": "value as written or null",
      "unit": "unit or null",
      "reference_range": "range as written or null",
      "abnormal": false
    }}
  ],
  "follow_up": [
    {{"kind": "recheck | specialist_referral | urgent_attention | other", "note": "why"}}
  ]
}}
```"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_wraps_document() {
        let p = build_analysis_prompt("Glucosio | 95 | mg/dL", None);
        assert!(p.contains("<document>\nGlucosio | 95 | mg/dL\n</document>"));
        assert!(!p.contains("filed as"));
    }

    #[test]
    fn prompt_names_document_type() {
        let p = build_analysis_prompt("testo", Some(DocumentType::Laboratorio));
        assert!(p.starts_with("The document is filed as: LABORATORIO."));
    }

    #[test]
    fn system_prompt_lists_placeholders() {
        for placeholder in ["[NOME]", "[CF]", "[DATA_NASCITA]"] {
            assert!(ANALYSIS_SYSTEM_PROMPT.contains(placeholder));
        }
    }
}

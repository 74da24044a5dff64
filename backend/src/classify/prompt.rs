//! Prompt generation for column classification.
//!
//! Builds the messages sent to the oracle so it can map arbitrary
//! spreadsheet columns onto the canonical participant fields.

use serde_json::Value;

/// The column mapping JSON schema (embedded at compile time)
const MAPPING_SCHEMA: &str = include_str!("../../schemas/column-mapping-schema.json");

/// Generate the system prompt for column classification.
pub fn system_prompt() -> String {
    format!(
        r#"You are a data reconciliation expert. Your task is to analyze attendee spreadsheet data and decide how its columns map onto a canonical participant schema.

## Your Mission

Given:
1. The full list of column headers
2. A small sample of data rows (as JSON objects)

You must return a valid JSON column mapping.

## CRITICAL: Output Format

You MUST return ONLY valid JSON matching this schema EXACTLY:

```json
{mapping_schema}
```

## Canonical Participant Fields

- `fullName`: the attendee's full name
- `email`: the attendee's email address
- `nationalId`: national identity document number (DNI, cedula, CI, ...)
- `area`: department, team, company area or similar grouping

## Identifier Selection

Pick the ONE column whose value best identifies each row, in this order of
preference: national id, then email, then full name. Set `identifierType`
accordingly to "dni", "email" or "name", and `identifierColumn` to that
column's exact header.

## Rules

1. Use exact header strings from the supplied list (case-sensitive)
2. Every mapping value must be one of the supplied headers, or null when no column fits
3. Do NOT invent column names that are not in the headers
4. A single column may appear in both `identifierColumn` and a mapping (e.g. a cedula column)
5. Return ONLY the JSON object, no explanations or markdown"#,
        mapping_schema = MAPPING_SCHEMA
    )
}

/// Build the user message carrying headers and sample rows.
pub fn user_prompt(headers: &[String], sample_rows: &[Value]) -> String {
    format!(
        r#"## Column Headers

{headers}

## Sample Rows ({count} shown)

```json
{sample}
```

Return the column mapping JSON now."#,
        headers = serde_json::to_string(headers).unwrap_or_default(),
        count = sample_rows.len(),
        sample = serde_json::to_string_pretty(sample_rows).unwrap_or_default(),
    )
}

/// Build the messages array for the oracle request.
pub fn build_messages(headers: &[String], sample_rows: &[Value]) -> Vec<Value> {
    vec![serde_json::json!({
        "role": "user",
        "content": user_prompt(headers, sample_rows)
    })]
}

use serde_json::{Map, Value as JsonValue};
use serde_yaml::Value as YamlValue;

use crate::model::Frontmatter;

/// Result of splitting a markdown source into its YAML frontmatter and body.
pub struct ParsedDocument {
    pub frontmatter_present: bool,
    pub frontmatter_raw: JsonValue,
    pub frontmatter: Frontmatter,
    pub body: String,
}

/// Splits `source` on the `---` / `---` delimiter pair and parses the
/// enclosed YAML as JSON. Pipeline step 4 (§4.5).
pub fn parse_document(source: &str) -> ParsedDocument {
    let (frontmatter_source, body) = split_frontmatter(source);

    let Some(frontmatter_source) = frontmatter_source else {
        return ParsedDocument {
            frontmatter_present: false,
            frontmatter_raw: JsonValue::Object(Map::new()),
            frontmatter: Frontmatter::default(),
            body: body.to_string(),
        };
    };

    let raw = parse_yaml_as_json(frontmatter_source);
    let typed: Frontmatter = serde_json::from_value(raw.clone()).unwrap_or_default();

    ParsedDocument {
        frontmatter_present: true,
        frontmatter_raw: raw,
        frontmatter: typed,
        body: body.to_string(),
    }
}

/// Returns `(Some(yaml_body), markdown_body)` when the source opens with a
/// `---` delimited block, otherwise `(None, source)`.
fn split_frontmatter(source: &str) -> (Option<&str>, &str) {
    let trimmed = source.trim_start_matches(['\u{FEFF}', '\u{200B}']);
    let after_bom_len = source.len() - trimmed.len();
    let leading_ws = trimmed.len() - trimmed.trim_start().len();
    let start = after_bom_len + leading_ws;
    let content = &source[start..];

    if !content.starts_with("---") {
        return (None, source);
    }

    let mut offset = 0usize;
    let mut lines = content.split_inclusive('\n');
    let first_line = match lines.next() {
        Some(line) => line,
        None => return (None, source),
    };
    if !is_delimiter_line(first_line) {
        return (None, source);
    }
    offset += first_line.len();

    let yaml_start = offset;
    for line in lines {
        if is_delimiter_line(line) {
            let yaml_end = offset;
            offset += line.len();
            let body_start = start + offset;
            return (
                Some(&content[yaml_start..yaml_end]),
                source[body_start..].trim_start_matches('\n'),
            );
        }
        offset += line.len();
    }

    (None, source)
}

fn is_delimiter_line(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']).trim() == "---"
}

fn parse_yaml_as_json(yaml_source: &str) -> JsonValue {
    let parsed: Result<YamlValue, _> = serde_yaml::from_str(yaml_source);
    match parsed {
        Ok(YamlValue::Mapping(_)) => yaml_to_json(parsed.unwrap()),
        Ok(_) | Err(_) => JsonValue::Object(Map::new()),
    }
}

fn yaml_to_json(value: YamlValue) -> JsonValue {
    match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(v) => JsonValue::Bool(v),
        YamlValue::Number(num) => yaml_number_to_json(num),
        YamlValue::String(v) => JsonValue::String(v),
        YamlValue::Sequence(items) => JsonValue::Array(items.into_iter().map(yaml_to_json).collect()),
        YamlValue::Mapping(map) => {
            let mut object = Map::new();
            for (key, val) in map {
                object.insert(yaml_key_to_string(key), yaml_to_json(val));
            }
            JsonValue::Object(object)
        }
        YamlValue::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_number_to_json(num: serde_yaml::Number) -> JsonValue {
    if let Some(value) = num.as_i64() {
        return JsonValue::Number(value.into());
    }
    if let Some(value) = num.as_u64() {
        return JsonValue::Number(value.into());
    }
    if let Some(value) = num.as_f64() {
        if let Some(number) = serde_json::Number::from_f64(value) {
            return JsonValue::Number(number);
        }
    }
    JsonValue::Null
}

fn yaml_key_to_string(value: YamlValue) -> String {
    match value {
        YamlValue::String(v) => v,
        YamlValue::Bool(v) => v.to_string(),
        YamlValue::Number(v) => v.to_string(),
        YamlValue::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "<unserializable-key>".to_string()),
    }
}

/// The designated embedding surface for a parsed document: `title + summary +
/// body` (§4.5 step 6).
pub fn embedding_surface(parsed: &ParsedDocument) -> String {
    let mut parts = Vec::new();
    if let Some(title) = &parsed.frontmatter.title {
        parts.push(title.clone());
    }
    if let Some(summary) = &parsed.frontmatter.summary {
        parts.push(summary.clone());
    }
    parts.push(parsed.body.clone());
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frontmatter_and_body() {
        let source = "---\ntitle: Hello\ndoc_type: problem\n---\n# Body\ntext\n";
        let parsed = parse_document(source);
        assert!(parsed.frontmatter_present);
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("Hello"));
        assert_eq!(parsed.frontmatter.doc_type.as_deref(), Some("problem"));
        assert_eq!(parsed.body, "# Body\ntext\n");
    }

    #[test]
    fn source_without_frontmatter_is_accepted_with_minimal_metadata() {
        let source = "# Just a body\n";
        let parsed = parse_document(source);
        assert!(!parsed.frontmatter_present);
        assert_eq!(parsed.body, source);
    }

    #[test]
    fn unterminated_frontmatter_block_falls_back_to_whole_source_as_body() {
        let source = "---\ntitle: Hello\nno closing delimiter\n";
        let parsed = parse_document(source);
        assert!(!parsed.frontmatter_present);
        assert_eq!(parsed.body, source);
    }

    #[test]
    fn bom_and_zero_width_space_are_stripped_before_detecting_delimiter() {
        let source = "\u{FEFF}---\ntitle: X\n---\nbody\n";
        let parsed = parse_document(source);
        assert!(parsed.frontmatter_present);
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("X"));
    }

    #[test]
    fn embedding_surface_joins_title_summary_and_body() {
        let source = "---\ntitle: T\nsummary: S\n---\nBody text\n";
        let parsed = parse_document(source);
        assert_eq!(embedding_surface(&parsed), "T\n\nS\n\nBody text\n");
    }
}

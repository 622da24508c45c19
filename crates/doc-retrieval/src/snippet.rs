use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

const DEFAULT_SNIPPET_CHARS: usize = 240;

/// Strips markdown formatting down to plain text and truncates to a preview
/// length, mirroring the teacher's indexing-preview approach but tuned for
/// search-result snippets rather than full-body previews.
pub fn preview_snippet(body: &str, max_chars: usize) -> String {
    if body.trim().is_empty() {
        return String::new();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut output = String::new();
    let mut skip_depth = 0usize;

    for event in Parser::new_ext(body, options) {
        match event {
            Event::Start(Tag::CodeBlock(_) | Tag::Image { .. } | Tag::Table(_)) => {
                skip_depth += 1;
            }
            Event::End(TagEnd::CodeBlock | TagEnd::Image | TagEnd::Table) => {
                skip_depth = skip_depth.saturating_sub(1);
            }
            Event::Text(text) | Event::Code(text) if skip_depth == 0 => {
                if !output.is_empty() && !output.ends_with(' ') {
                    output.push(' ');
                }
                output.push_str(&text);
            }
            Event::SoftBreak | Event::HardBreak if skip_depth == 0 => {
                if !output.ends_with(' ') {
                    output.push(' ');
                }
            }
            _ => {}
        }

        if output.chars().count() >= max_chars {
            break;
        }
    }

    truncate(&output, max_chars)
}

pub fn default_preview_snippet(body: &str) -> String {
    preview_snippet(body, DEFAULT_SNIPPET_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars).collect();
    format!("{}…", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_heading_markers_and_emphasis() {
        let snippet = preview_snippet("# Title\n\nSome **bold** text.", 100);
        assert_eq!(snippet, "Title Some bold text.");
    }

    #[test]
    fn truncates_long_bodies_with_ellipsis() {
        let body = "word ".repeat(200);
        let snippet = preview_snippet(&body, 20);
        assert!(snippet.ends_with('…'));
        assert!(snippet.chars().count() <= 21);
    }

    #[test]
    fn skips_code_blocks() {
        let snippet = preview_snippet("intro\n\n```\nsecret_code()\n```\n\noutro", 100);
        assert!(!snippet.contains("secret_code"));
        assert!(snippet.contains("intro"));
        assert!(snippet.contains("outro"));
    }
}

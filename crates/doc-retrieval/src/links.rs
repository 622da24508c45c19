use pulldown_cmark::{Event, Parser, Tag};

/// Extracts relative `.md` link targets from a document body, resolved
/// against `source_relative_path`'s directory. External URLs (anything with
/// a scheme) are excluded (§4.8 link traversal).
pub fn extract_markdown_links(body: &str, source_relative_path: &str) -> Vec<String> {
    let mut links = Vec::new();
    for event in Parser::new(body) {
        if let Event::Start(Tag::Link { dest_url, .. }) = event {
            if let Some(resolved) = resolve_relative_md_link(&dest_url, source_relative_path) {
                links.push(resolved);
            }
        }
    }
    links
}

fn resolve_relative_md_link(dest_url: &str, source_relative_path: &str) -> Option<String> {
    let target = dest_url.split(['#', '?']).next().unwrap_or(dest_url);
    if target.is_empty() || is_external(target) || !target.ends_with(".md") {
        return None;
    }

    let base_dir = std::path::Path::new(source_relative_path)
        .parent()
        .unwrap_or_else(|| std::path::Path::new(""));
    let joined = base_dir.join(target);
    Some(normalize(&joined))
}

fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:") || target.starts_with('/')
}

fn normalize(path: &std::path::Path) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::Normal(part) => {
                parts.push(part.to_str().unwrap_or_default());
            }
            _ => {}
        }
    }
    parts.join("/")
}

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Bodies at or below this line count are stored unchunked (§4.5 step 7,
/// §8 boundary: 500 lines no chunk, 501 lines chunks).
pub const CHUNK_LINE_THRESHOLD: usize = 500;

/// Target size and overlap for the fixed-span fallback, in characters.
const FIXED_SPAN_SIZE: usize = 2000;
const FIXED_SPAN_OVERLAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive.
    pub end_line: u32,
    pub content: String,
}

pub fn needs_chunking(body: &str) -> bool {
    line_count(body) > CHUNK_LINE_THRESHOLD
}

fn line_count(body: &str) -> usize {
    if body.is_empty() {
        0
    } else {
        body.lines().count()
    }
}

/// Splits `body` into chunks. Prefers heading boundaries when the body has at
/// least two top-level headings; otherwise falls back to fixed-size spans
/// with overlap (§4.5 step 7, §9 chunking boundary policy).
pub fn chunk_body(body: &str) -> Vec<ChunkSpan> {
    if !needs_chunking(body) {
        let lines = line_count(body).max(1) as u32;
        return vec![ChunkSpan {
            start_line: 1,
            end_line: lines,
            content: body.to_string(),
        }];
    }

    let heading_lines = heading_start_lines(body);
    if heading_lines.len() >= 2 {
        chunk_by_headings(body, &heading_lines)
    } else {
        chunk_by_fixed_span(body)
    }
}

/// 0-based line indices on which a markdown heading starts.
fn heading_start_lines(body: &str) -> Vec<usize> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(body, options).into_offset_iter();

    let mut starts = Vec::new();
    for (event, range) in parser {
        if let Event::Start(Tag::Heading { .. }) = event {
            starts.push(byte_offset_to_line(body, range.start));
        }
    }
    starts
}

fn byte_offset_to_line(body: &str, offset: usize) -> usize {
    body.as_bytes()[..offset.min(body.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
}

fn chunk_by_headings(body: &str, heading_lines: &[usize]) -> Vec<ChunkSpan> {
    let lines: Vec<&str> = body.lines().collect();
    let total_lines = lines.len();

    let mut boundaries = heading_lines.to_vec();
    if boundaries[0] != 0 {
        boundaries.insert(0, 0);
    }
    boundaries.push(total_lines);
    boundaries.dedup();

    let mut chunks = Vec::new();
    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start >= end {
            continue;
        }
        let content = lines[start..end].join("\n");
        chunks.push(ChunkSpan {
            start_line: (start + 1) as u32,
            end_line: end as u32,
            content,
        });
    }
    chunks
}

fn chunk_by_fixed_span(body: &str) -> Vec<ChunkSpan> {
    let lines: Vec<&str> = body.lines().collect();
    // Cumulative char length up to and including each line (plus its newline).
    let mut line_end_offset = Vec::with_capacity(lines.len());
    let mut running = 0usize;
    for line in &lines {
        running += line.chars().count() + 1;
        line_end_offset.push(running);
    }

    let mut chunks = Vec::new();
    let mut start_line = 0usize;
    while start_line < lines.len() {
        let start_offset = if start_line == 0 {
            0
        } else {
            line_end_offset[start_line - 1]
        };
        let target_end_offset = start_offset + FIXED_SPAN_SIZE;

        let mut end_line = start_line;
        while end_line < lines.len() && line_end_offset[end_line] < target_end_offset {
            end_line += 1;
        }
        end_line = end_line.min(lines.len() - 1);

        let content = lines[start_line..=end_line].join("\n");
        chunks.push(ChunkSpan {
            start_line: (start_line + 1) as u32,
            end_line: (end_line + 1) as u32,
            content,
        });

        if end_line + 1 >= lines.len() {
            break;
        }

        // Step back by roughly FIXED_SPAN_OVERLAP chars worth of lines.
        let mut overlap_start = end_line;
        let end_offset = line_end_offset[end_line];
        while overlap_start > start_line
            && end_offset - line_end_offset[overlap_start - 1] < FIXED_SPAN_OVERLAP
        {
            overlap_start -= 1;
        }
        start_line = (overlap_start + 1).max(start_line + 1);
    }
    chunks
}

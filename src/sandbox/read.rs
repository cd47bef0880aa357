//! `read_file_range`

use super::{read_text, Sandbox, SandboxError};
use serde::Serialize;

/// Lines returned when only `start_line` is given
pub const DEFAULT_LINE_WINDOW: usize = 200;

/// Upper bound on the text of a single read, by lines or by bytes
pub const MAX_SLICE_BYTES: usize = 64 * 1024;

/// Requested range. Line and byte addressing are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeRequest {
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub start_byte: Option<i64>,
    pub length: Option<i64>,
}

/// A clipped slice of a document.
///
/// `end_line < start_line` denotes an empty slice. A start past the end of the
/// document is echoed back as requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSlice {
    pub path: String,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub total_lines: usize,
    /// The range was cut short at [`MAX_SLICE_BYTES`]
    pub truncated: bool,
}

struct Span {
    start: usize,
    end: usize,
    /// Requested first line when it lies past the last line
    past_end: Option<usize>,
    truncated: bool,
}

/// Byte offset of the start of every line.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = Vec::new();
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            starts.push(offset);
            offset += line.len();
        }
        Self { starts }
    }

    fn total(&self) -> usize {
        self.starts.len()
    }

    /// 1-indexed line containing `byte`
    fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&start| start <= byte).max(1)
    }
}

fn clamp_non_negative(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

impl Sandbox {
    pub fn read_file_range(
        &self,
        path: &str,
        range: RangeRequest,
    ) -> Result<FileSlice, SandboxError> {
        let canonical = self.resolve_document(path)?;
        let text = read_text(&canonical, path)?;
        let index = LineIndex::new(&text);

        let by_bytes = range.start_byte.is_some() || range.length.is_some();
        let by_lines = range.start_line.is_some() || range.end_line.is_some();
        if by_bytes && by_lines {
            return Err(SandboxError::InvalidRange(
                "line and byte ranges cannot be combined".to_string(),
            ));
        }

        let span = if by_bytes {
            byte_bounds(&text, range)
        } else {
            line_bounds(&text, &index, range)?
        };
        let (start, end) = (span.start, span.end);

        let slice = text.get(start..end).unwrap_or_default().to_string();
        let start_line = match span.past_end {
            Some(line) => line,
            None if text.is_empty() => 1,
            None => index.line_of(start),
        };
        let end_line = if end > start {
            index.line_of(end - 1)
        } else {
            start_line - 1
        };

        Ok(FileSlice {
            path: path.to_string(),
            text: slice,
            start_line,
            end_line,
            start_byte: start,
            end_byte: end,
            total_lines: index.total(),
            truncated: span.truncated,
        })
    }
}

fn byte_bounds(text: &str, range: RangeRequest) -> Span {
    let len = text.len();
    let start = clamp_non_negative(range.start_byte.unwrap_or(0)).min(len);
    let requested = range.length.map_or(len - start, clamp_non_negative);
    let end = start
        .saturating_add(requested.min(MAX_SLICE_BYTES))
        .min(len);
    Span {
        start: floor_char_boundary(text, start),
        end: floor_char_boundary(text, end),
        past_end: None,
        truncated: requested > MAX_SLICE_BYTES && end < len,
    }
}

fn line_bounds(
    text: &str,
    index: &LineIndex,
    range: RangeRequest,
) -> Result<Span, SandboxError> {
    let total = index.total();
    let start_line = clamp_non_negative(range.start_line.unwrap_or(1)).max(1);
    let end_line = match range.end_line {
        Some(end) => {
            let end = clamp_non_negative(end);
            if end < start_line {
                return Err(SandboxError::InvalidRange(format!(
                    "end_line {end} is before start_line {start_line}"
                )));
            }
            end
        }
        None => start_line.saturating_add(DEFAULT_LINE_WINDOW - 1),
    };

    if start_line > total {
        return Ok(Span {
            start: text.len(),
            end: text.len(),
            past_end: Some(start_line),
            truncated: false,
        });
    }
    let end_line = end_line.min(total);
    let start = index.starts[start_line - 1];
    let end = index.starts.get(end_line).copied().unwrap_or(text.len());
    let capped = cap_at_line(text, index, start, end);
    Ok(Span {
        start,
        end: capped,
        past_end: None,
        truncated: capped < end,
    })
}

/// End of `start..end` shrunk to [`MAX_SLICE_BYTES`], on a line boundary
/// unless the first line alone is longer.
fn cap_at_line(text: &str, index: &LineIndex, start: usize, end: usize) -> usize {
    if end - start <= MAX_SLICE_BYTES {
        return end;
    }
    let limit = start + MAX_SLICE_BYTES;
    let cut = index.starts[index.starts.partition_point(|&s| s <= limit) - 1];
    if cut > start {
        cut
    } else {
        floor_char_boundary(text, limit)
    }
}

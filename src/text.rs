//! Text position utilities for byte offset and line:column conversions.
//!
//! All module text is UTF-8 `&str`; offsets are 0-indexed byte offsets and
//! lines/columns are 1-indexed (matching editor conventions). Columns count
//! bytes, which equals characters for the ASCII-dominant sources this engine
//! rewrites. Line/column values of 0 are clamped to 1.

use crate::rewrite::Span;

// ============================================================================
// Offset / Position Conversions
// ============================================================================

/// Convert a byte offset to 1-indexed line and column.
///
/// If `offset` exceeds the content length, returns the position at end of
/// content.
pub fn offset_to_line_col(content: &str, offset: u64) -> (u32, u32) {
    let offset = (offset as usize).min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;

    for (i, byte) in content.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Convert 1-indexed line and column to a byte offset.
///
/// A column past the end of its line clamps to the line end; a line past the
/// end of the content returns the content length.
pub fn line_col_to_offset(content: &str, line: u32, col: u32) -> u64 {
    let line = line.max(1);
    let col = col.max(1);

    let mut current_line = 1u32;
    for (i, byte) in content.bytes().enumerate() {
        if current_line == line {
            let offset_in_line = (col as usize).saturating_sub(1);
            let line_end = content[i..]
                .find('\n')
                .map(|p| i + p)
                .unwrap_or(content.len());
            return (i + offset_in_line.min(line_end - i)) as u64;
        }
        if byte == b'\n' {
            current_line += 1;
        }
    }

    content.len() as u64
}

// ============================================================================
// Span Utilities
// ============================================================================

/// Extract the text of a span.
///
/// Returns `None` if the span extends beyond the content or splits a
/// multi-byte character.
pub fn extract_span<'a>(content: &'a str, span: &Span) -> Option<&'a str> {
    content.get(span.start as usize..span.end as usize)
}

/// Get the 1-indexed line range spanned by a byte span.
pub fn span_to_line_range(content: &str, span: &Span) -> (u32, u32) {
    let (start_line, _) = offset_to_line_col(content, span.start);
    let (end_line, _) = offset_to_line_col(content, span.end.saturating_sub(1).max(span.start));
    (start_line, end_line)
}

// ============================================================================
// Line Utilities
// ============================================================================

/// The full line containing `offset`, from line start through the trailing
/// newline (or content end when the last line has none).
///
/// Deleting this span removes the line without leaving a blank one behind.
pub fn line_bounds(content: &str, offset: u64) -> Span {
    let offset = (offset as usize).min(content.len());
    let start = content[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let end = content[offset..]
        .find('\n')
        .map(|p| offset + p + 1)
        .unwrap_or(content.len());
    Span::new(start as u64, end as u64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod conversion_tests {
        use super::*;

        #[test]
        fn offset_to_line_col_simple() {
            let content = "Dim a\nDim b\nDim c\n";
            assert_eq!(offset_to_line_col(content, 0), (1, 1));
            assert_eq!(offset_to_line_col(content, 4), (1, 5));
            assert_eq!(offset_to_line_col(content, 5), (1, 6)); // newline char
            assert_eq!(offset_to_line_col(content, 6), (2, 1));
            assert_eq!(offset_to_line_col(content, 12), (3, 1));
        }

        #[test]
        fn line_col_to_offset_simple() {
            let content = "Dim a\nDim b\nDim c\n";
            assert_eq!(line_col_to_offset(content, 1, 1), 0);
            assert_eq!(line_col_to_offset(content, 1, 5), 4);
            assert_eq!(line_col_to_offset(content, 2, 1), 6);
            assert_eq!(line_col_to_offset(content, 3, 1), 12);
        }

        #[test]
        fn roundtrip() {
            let content = "Public Sub Foo()\n    Debug.Print 1\nEnd Sub\n";
            for offset in 0..content.len() as u64 {
                let (line, col) = offset_to_line_col(content, offset);
                let recovered = line_col_to_offset(content, line, col);
                assert_eq!(
                    recovered, offset,
                    "roundtrip failed for offset {}: line={}, col={}",
                    offset, line, col
                );
            }
        }

        #[test]
        fn offset_beyond_content() {
            let content = "short";
            assert_eq!(offset_to_line_col(content, 100), (1, 6));
        }

        #[test]
        fn position_beyond_content() {
            let content = "short";
            assert_eq!(line_col_to_offset(content, 100, 1), 5);
        }

        #[test]
        fn col_beyond_line_end_clamps() {
            let content = "ab\ncd\n";
            assert_eq!(line_col_to_offset(content, 1, 100), 2); // position of \n
        }

        #[test]
        fn zero_line_col_clamped() {
            let content = "test";
            assert_eq!(line_col_to_offset(content, 0, 0), 0);
            assert_eq!(line_col_to_offset(content, 1, 0), 0);
        }

        #[test]
        fn empty_content() {
            assert_eq!(offset_to_line_col("", 0), (1, 1));
            assert_eq!(line_col_to_offset("", 1, 1), 0);
        }
    }

    mod span_tests {
        use super::*;

        #[test]
        fn extract_valid() {
            let content = "Private mValue As Long";
            assert_eq!(extract_span(content, &Span::new(8, 14)), Some("mValue"));
        }

        #[test]
        fn extract_out_of_bounds() {
            assert_eq!(extract_span("short", &Span::new(0, 100)), None);
        }

        #[test]
        fn line_range_single_line() {
            let content = "Public Sub Foo(): End Sub\n";
            assert_eq!(span_to_line_range(content, &Span::new(11, 14)), (1, 1));
        }

        #[test]
        fn line_range_multi_line() {
            let content = "Dim a\nDim b\nDim c\n";
            assert_eq!(span_to_line_range(content, &Span::new(0, 12)), (1, 2));
        }
    }

    mod line_tests {
        use super::*;

        #[test]
        fn bounds_of_middle_line() {
            let content = "Dim a\nDim b\nDim c\n";
            let span = line_bounds(content, 8);
            assert_eq!(span, Span::new(6, 12));
            assert_eq!(extract_span(content, &span), Some("Dim b\n"));
        }

        #[test]
        fn bounds_of_first_line() {
            let content = "Dim a\nDim b\n";
            assert_eq!(line_bounds(content, 0), Span::new(0, 6));
        }

        #[test]
        fn bounds_of_last_line_without_newline() {
            let content = "Dim a\nDim b";
            assert_eq!(line_bounds(content, 8), Span::new(6, 11));
        }
    }
}

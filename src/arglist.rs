//! Call-site argument-list scanning.
//!
//! Signature rewriting works from parser spans, but arguments at call sites
//! carry no spans of their own; this module recovers them from the call's
//! statement text. Scanning always starts at the referenced identifier's
//! known offset and moves forward only, so repeated literal tokens elsewhere
//! in the statement can never be mismatched.
//!
//! ## Recognized shapes
//!
//! ```text
//! Foo(1, "x", True)          parenthesized list after the identifier
//! result = Foo(1, g(2), 3)   nested calls stay inside their parens
//! Foo 1, "x", True           bare list when the identifier opens the statement
//! Call Foo(1, 2)             `Call` keyword prefix
//! x = someValue              no list; the occurrence is a plain value use
//! ```
//!
//! Top-level commas split arguments; commas inside nested parentheses or
//! string literals (with `""` doubling) do not. A list that never closes is
//! reported as an error; the caller decides whether that skips one call
//! site or aborts.

use thiserror::Error;
use winnow::combinator::opt;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_till;
use winnow::ModalResult;

use crate::rewrite::Span;

/// Error from argument-list scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgScanError {
    /// A parenthesized list or string literal never closes.
    #[error("argument list is not terminated (scan stopped at offset {at})")]
    Unterminated {
        /// Absolute byte offset where scanning gave up.
        at: u64,
    },
}

/// One argument's text and position, trimmed of surrounding whitespace.
///
/// An omitted positional argument (`Foo(1, , 3)`) appears as an empty-text
/// argument with a zero-width span, so slot alignment is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Absolute span of the argument text.
    pub span: Span,
    /// The argument text.
    pub text: String,
}

impl Argument {
    /// Whether this slot was passed without a value.
    pub fn is_omitted(&self) -> bool {
        self.text.is_empty()
    }
}

/// A scanned argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentList {
    /// Absolute span of the list text: between the parentheses, or the bare
    /// list's extent.
    pub list_span: Span,
    /// Whether the list was parenthesized.
    pub parenthesized: bool,
    /// Arguments in source order.
    pub arguments: Vec<Argument>,
}

/// Scan the argument list attached to an identifier occurrence.
///
/// `context` is the call's statement text, starting at absolute offset
/// `context_start`; `name_span` is the identifier occurrence within it.
/// Returns `Ok(None)` when the occurrence carries no argument list (a plain
/// value use of the identifier).
///
/// # Panics
/// Panics if `name_span` does not lie within the context.
pub fn scan_arguments(
    context: &str,
    context_start: u64,
    name_span: Span,
) -> Result<Option<ArgumentList>, ArgScanError> {
    let rel_start = name_span
        .start
        .checked_sub(context_start)
        .expect("identifier must lie within its context") as usize;
    let rel_end = (name_span.end - context_start) as usize;
    assert!(
        rel_end <= context.len(),
        "identifier must lie within its context"
    );

    let after = &context[rel_end..];
    let gap = after.len() - after.trim_start_matches([' ', '\t']).len();
    let list_rel = rel_end + gap;

    let before = context[..rel_start].trim();
    let statement_initial = before.is_empty() || dotted_receiver(before);
    let call_prefixed = before.eq_ignore_ascii_case("call");

    if context[list_rel..].starts_with('(') {
        // In statement position a space before the paren means the paren
        // groups the first argument of a bare list (`Foo (1 + 2), 3`); an
        // adjacent paren, a `Call` prefix, or expression position all make
        // the parens the argument list itself.
        if !(statement_initial && gap > 0) {
            let list = parse_parenthesized(context, context_start, list_rel)?;
            return Ok(Some(list));
        }
    }

    // A bare list is only a call when the identifier opens the statement,
    // directly, behind a receiver chain, or behind the `Call` keyword;
    // anything else is the identifier used as a value.
    if !(statement_initial || call_prefixed) {
        return Ok(None);
    }
    let tail = context[list_rel..].trim_start();
    if tail.is_empty() || tail.starts_with('=') {
        // Nothing follows, or the occurrence is an assignment target.
        return Ok(None);
    }

    Ok(Some(parse_bare(context, context_start, list_rel)))
}

/// True when everything before the identifier is a dotted receiver chain
/// (`sheet.`, `cells(2).`, a bare `.` inside a With block), which leaves
/// the occurrence in statement position just as if it opened the line.
fn dotted_receiver(before: &str) -> bool {
    if !before.ends_with('.') {
        return false;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    for c in before.chars() {
        if in_string {
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            '.' | '_' => {}
            c if c.is_ascii_alphanumeric() => {}
            ' ' | '\t' if depth > 0 => {}
            _ => return false,
        }
    }
    depth == 0 && !in_string
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

/// Consume a string literal, honoring `""` doubling.
fn scan_string(input: &mut &str) -> ModalResult<()> {
    let _ = '"'.parse_next(input)?;
    loop {
        let _ = take_till(0.., '"').parse_next(input)?;
        let _ = '"'.parse_next(input)?;
        if opt('"').parse_next(input)?.is_none() {
            return Ok(());
        }
    }
}

/// Consume a balanced parenthesized group, strings included.
fn scan_group(input: &mut &str) -> ModalResult<()> {
    let _ = '('.parse_next(input)?;
    loop {
        let _ = take_till(0.., ['(', ')', '"']).parse_next(input)?;
        match input.chars().next() {
            Some('(') => scan_group(input)?,
            Some('"') => scan_string(input)?,
            Some(')') => {
                let _ = ')'.parse_next(input)?;
                return Ok(());
            }
            _ => return Err(ErrMode::from_input(input)),
        }
    }
}

/// Consume one argument's text up to a top-level delimiter. Returns the
/// delimiter without consuming it, or `None` at end of input.
fn scan_argument_text(input: &mut &str, stop_at_close: bool) -> ModalResult<Option<char>> {
    loop {
        let _ = take_till(0.., ['(', ')', '"', ',']).parse_next(input)?;
        match input.chars().next() {
            Some('(') => scan_group(input)?,
            Some('"') => scan_string(input)?,
            Some(')') if stop_at_close => return Ok(Some(')')),
            Some(')') => {
                let _ = ')'.parse_next(input)?;
            }
            Some(',') => return Ok(Some(',')),
            Some(other) => {
                debug_assert!(false, "unhandled delimiter {:?}", other);
                return Err(ErrMode::from_input(input));
            }
            None => return Ok(None),
        }
    }
}

fn parse_parenthesized(
    context: &str,
    context_start: u64,
    open_rel: usize,
) -> Result<ArgumentList, ArgScanError> {
    let base_len = context.len();
    let mut input = &context[open_rel + 1..];
    let mut arguments = Vec::new();

    // Empty list: nothing but whitespace before the close.
    let probe = input.trim_start();
    if let Some(rest) = probe.strip_prefix(')') {
        let close_rel = base_len - rest.len() - 1;
        return Ok(ArgumentList {
            list_span: Span::new(
                context_start + (open_rel + 1) as u64,
                context_start + close_rel as u64,
            ),
            parenthesized: true,
            arguments,
        });
    }

    loop {
        let piece_start = base_len - input.len();
        let delimiter = scan_argument_text(&mut input, true)
            .map_err(|_| ArgScanError::Unterminated {
                at: context_start + (base_len - input.len()) as u64,
            })?
            .ok_or(ArgScanError::Unterminated {
                at: context_start + base_len as u64,
            })?;
        let piece_end = base_len - input.len();
        arguments.push(trimmed_argument(
            context,
            context_start,
            piece_start,
            piece_end,
        ));

        // Consume the delimiter we stopped at.
        let mut tail = input.chars();
        tail.next();
        input = tail.as_str();
        if delimiter == ')' {
            let close_rel = piece_end;
            return Ok(ArgumentList {
                list_span: Span::new(
                    context_start + (open_rel + 1) as u64,
                    context_start + close_rel as u64,
                ),
                parenthesized: true,
                arguments,
            });
        }
    }
}

fn parse_bare(context: &str, context_start: u64, list_rel: usize) -> ArgumentList {
    let base_len = context.len();
    let mut input = &context[list_rel..];
    let mut arguments = Vec::new();

    loop {
        let piece_start = base_len - input.len();
        // Only an unterminated string can fail here, and a string that runs
        // to end of statement still splits correctly at its last quote; a
        // scan failure degrades to "rest of statement is one argument".
        let delimiter = scan_argument_text(&mut input, false).unwrap_or(None);
        let piece_end = if delimiter.is_some() {
            base_len - input.len()
        } else {
            base_len
        };
        arguments.push(trimmed_argument(
            context,
            context_start,
            piece_start,
            piece_end,
        ));

        match delimiter {
            Some(_) => {
                let mut tail = input.chars();
                tail.next();
                input = tail.as_str();
            }
            None => {
                let end = arguments.last().map(|a| a.span.end).unwrap_or(0);
                return ArgumentList {
                    list_span: Span::new(context_start + list_rel as u64, end),
                    parenthesized: false,
                    arguments,
                };
            }
        }
    }
}

fn trimmed_argument(context: &str, context_start: u64, start: usize, end: usize) -> Argument {
    let raw = &context[start..end];
    let leading = raw.len() - raw.trim_start().len();
    let text = raw.trim();
    let trimmed_start = start + leading;
    Argument {
        span: Span::new(
            context_start + trimmed_start as u64,
            context_start + (trimmed_start + text.len()) as u64,
        ),
        text: text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn name_span_of(context: &str, name: &str) -> Span {
        let start = context.find(name).unwrap() as u64;
        Span::new(start, start + name.len() as u64)
    }

    fn scan(context: &str, name: &str) -> Option<ArgumentList> {
        scan_arguments(context, 0, name_span_of(context, name)).unwrap()
    }

    fn texts(list: &ArgumentList) -> Vec<&str> {
        list.arguments.iter().map(|a| a.text.as_str()).collect()
    }

    mod parenthesized_tests {
        use super::*;

        #[test]
        fn splits_simple_list() {
            let list = scan("Foo(1, \"x\", True)", "Foo").unwrap();
            assert!(list.parenthesized);
            assert_eq!(texts(&list), vec!["1", "\"x\"", "True"]);
        }

        #[test]
        fn nested_call_commas_do_not_split() {
            let list = scan("result = Foo(1, Bar(2, 3), 4)", "Foo").unwrap();
            assert_eq!(texts(&list), vec!["1", "Bar(2, 3)", "4"]);
        }

        #[test]
        fn string_commas_and_doubled_quotes_do_not_split() {
            let list = scan("Foo(\"a,b\", \"she said \"\"hi,there\"\"\", 3)", "Foo").unwrap();
            assert_eq!(
                texts(&list),
                vec!["\"a,b\"", "\"she said \"\"hi,there\"\"\"", "3"]
            );
        }

        #[test]
        fn omitted_arguments_keep_their_slots() {
            let list = scan("Foo(1, , 3)", "Foo").unwrap();
            assert_eq!(texts(&list), vec!["1", "", "3"]);
            assert!(list.arguments[1].is_omitted());
            assert!(list.arguments[1].span.is_empty());
        }

        #[test]
        fn empty_parens_mean_zero_arguments() {
            let list = scan("Foo()", "Foo").unwrap();
            assert!(list.arguments.is_empty());
            assert!(list.list_span.is_empty());
        }

        #[test]
        fn spans_are_absolute() {
            let context = "x = Foo(10, 20)";
            let offset = 100u64;
            let name = name_span_of(context, "Foo");
            let shifted = Span::new(name.start + offset, name.end + offset);
            let list = scan_arguments(context, offset, shifted).unwrap().unwrap();
            assert_eq!(list.arguments[0].span, Span::new(108, 110));
            assert_eq!(list.arguments[1].span, Span::new(112, 114));
        }

        #[test]
        fn unterminated_list_is_an_error() {
            let err = scan_arguments("Foo(1, 2", 0, Span::new(0, 3)).unwrap_err();
            assert!(matches!(err, ArgScanError::Unterminated { .. }));
        }

        #[test]
        fn unterminated_string_is_an_error() {
            let err = scan_arguments("Foo(\"abc)", 0, Span::new(0, 3)).unwrap_err();
            assert!(matches!(err, ArgScanError::Unterminated { .. }));
        }
    }

    mod bare_list_tests {
        use super::*;

        #[test]
        fn statement_call_without_parens() {
            let list = scan("Foo 1, \"x\", True", "Foo").unwrap();
            assert!(!list.parenthesized);
            assert_eq!(texts(&list), vec!["1", "\"x\"", "True"]);
        }

        #[test]
        fn call_keyword_prefix_is_statement_initial() {
            let list = scan("Call Foo(1, 2)", "Foo").unwrap();
            assert!(list.parenthesized);
            assert_eq!(texts(&list), vec!["1", "2"]);
        }

        #[test]
        fn indented_statement_call() {
            let list = scan("    Foo 1, 2", "Foo").unwrap();
            assert_eq!(texts(&list), vec!["1", "2"]);
        }

        #[test]
        fn grouped_first_argument_keeps_parens() {
            let list = scan("Foo (1 + 2), 3", "Foo").unwrap();
            assert!(!list.parenthesized);
            assert_eq!(texts(&list), vec!["(1 + 2)", "3"]);
        }

        #[test]
        fn dotted_receiver_is_statement_position() {
            let list = scan("sheet.Resize 10, 2", "Resize").unwrap();
            assert!(!list.parenthesized);
            assert_eq!(texts(&list), vec!["10", "2"]);
        }

        #[test]
        fn indexed_receiver_is_statement_position() {
            let list = scan("cells(2).Resize 10, 2", "Resize").unwrap();
            assert_eq!(texts(&list), vec!["10", "2"]);
        }

        #[test]
        fn with_block_member_call() {
            let list = scan("    .Resize 10, 2", "Resize").unwrap();
            assert_eq!(texts(&list), vec!["10", "2"]);
        }
    }

    mod value_use_tests {
        use super::*;

        #[test]
        fn plain_value_use_has_no_list() {
            assert!(scan("total = total + balance", "balance").is_none());
        }

        #[test]
        fn statement_call_with_no_arguments() {
            assert!(scan("Refresh", "Refresh").is_none());
        }

        #[test]
        fn value_use_followed_by_operator() {
            assert!(scan("x = Foo + 1", "Foo").is_none());
        }

        #[test]
        fn assignment_target_is_not_a_call() {
            assert!(scan("sheet.Total = 5", "Total").is_none());
        }

        #[test]
        fn return_assignment_is_not_a_call() {
            assert!(scan("Foo = Foo + 1", "Foo").is_none());
        }
    }
}


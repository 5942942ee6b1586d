//! Lexical helpers shared by the input-file importers.
//!
//! The input languages we scan are only loosely specified, so everything in
//! here works on plain string splitting rules rather than on a grammar.

/// Removes comments from `line` for languages where the same `marker` both
/// opens and closes a comment.
///
/// The line is split on every marker and only the even-indexed segments are
/// kept, so `a # c # b` becomes `a  b` and the text after an unpaired
/// marker is dropped.
pub fn strip_comments(line: &str, marker: char) -> String {
    line.split(marker).step_by(2).collect()
}

/// Splits `line` into words while keeping quoted text together.
///
/// Segments outside the `quote` character are split on whitespace, segments
/// inside it are kept as one word, so a file name containing spaces survives
/// as a single token.
pub fn quoted_words(line: &str, quote: char) -> Vec<String> {
    line.split(quote)
        .enumerate()
        .flat_map(|(i, segment)| {
            if i % 2 == 0 {
                segment
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            } else {
                vec![segment.to_string()]
            }
        })
        .collect()
}

/// Case-insensitive `starts_with` that returns the remainder on success.
pub fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

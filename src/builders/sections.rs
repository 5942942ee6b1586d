//! Token-driven state machine for `%name ... end` style input sections.

/// A fully closed section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Lowercased name following the open marker.
    pub name: String,
    /// Body tokens joined by single spaces, without the final close keyword.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    /// Not inside any section.
    Outside,
    /// Saw a bare open marker, the next token is the section name.
    AwaitingName,
    /// Inside a section; `depth` counts open blocks including the section.
    Inside {
        name: String,
        body: Vec<String>,
        depth: u32,
    },
}

/// Everything the scanner did not turn into a section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leftovers {
    /// Tokens seen while no section was open.
    pub ignored: Vec<String>,
    /// Name of a section still open at the end of input.
    pub unterminated: Option<String>,
}

/// Splits a token stream into sections.
///
/// A token beginning with `open_marker` starts a section at depth one.
/// Inside it every keyword from `nested` opens a block of its own, and each
/// `close` keyword closes the innermost block; the section itself only
/// closes when the depth drops from one.
pub struct SectionScanner<'a> {
    open_marker: char,
    close: &'a str,
    nested: &'a [&'a str],
    state: ScanState,
    leftovers: Leftovers,
}

impl<'a> SectionScanner<'a> {
    pub fn new(open_marker: char, close: &'a str, nested: &'a [&'a str]) -> Self {
        Self {
            open_marker,
            close,
            nested,
            state: ScanState::Outside,
            leftovers: Leftovers::default(),
        }
    }

    /// Advances the machine by one token and returns a section when this
    /// token closed one.
    pub fn feed(&mut self, token: &str) -> Option<Section> {
        let state = std::mem::replace(&mut self.state, ScanState::Outside);
        let (next, finished) = match state {
            ScanState::Outside => match token.strip_prefix(self.open_marker) {
                Some("") => (ScanState::AwaitingName, None),
                Some(name) => (self.open(name), None),
                None => {
                    self.leftovers.ignored.push(token.to_string());
                    (ScanState::Outside, None)
                }
            },
            ScanState::AwaitingName => (self.open(token), None),
            ScanState::Inside {
                name,
                mut body,
                depth,
            } => {
                if token.eq_ignore_ascii_case(self.close) {
                    if depth == 1 {
                        let section = Section {
                            name,
                            body: body.join(" "),
                        };
                        (ScanState::Outside, Some(section))
                    } else {
                        body.push(token.to_string());
                        (
                            ScanState::Inside {
                                name,
                                body,
                                depth: depth - 1,
                            },
                            None,
                        )
                    }
                } else {
                    let depth = if self.opens_block(token) { depth + 1 } else { depth };
                    body.push(token.to_string());
                    (ScanState::Inside { name, body, depth }, None)
                }
            }
        };
        self.state = next;
        finished
    }

    /// Ends the scan, reporting what could not be attributed to a section.
    pub fn finish(mut self) -> Leftovers {
        match self.state {
            ScanState::Inside { name, .. } => self.leftovers.unterminated = Some(name),
            ScanState::AwaitingName => {
                self.leftovers.ignored.push(self.open_marker.to_string())
            }
            ScanState::Outside => {}
        }
        self.leftovers
    }

    fn open(&self, name: &str) -> ScanState {
        ScanState::Inside {
            name: name.to_ascii_lowercase(),
            body: Vec::new(),
            depth: 1,
        }
    }

    fn opens_block(&self, token: &str) -> bool {
        self.nested.iter().any(|k| k.eq_ignore_ascii_case(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &[&str] = &["constraints", "coords"];

    fn scan(text: &str) -> (Vec<Section>, Leftovers) {
        let mut scanner = SectionScanner::new('%', "end", NESTED);
        let sections = text
            .split_whitespace()
            .filter_map(|token| scanner.feed(token))
            .collect();
        (sections, scanner.finish())
    }

    #[test]
    fn test_simple_section() {
        let (sections, leftovers) = scan("%pal nprocs 4 end");
        assert_eq!(
            sections,
            vec![Section {
                name: "pal".to_string(),
                body: "nprocs 4".to_string()
            }]
        );
        assert_eq!(leftovers, Leftovers::default());
    }

    #[test]
    fn test_nested_block_needs_two_ends() {
        let mut scanner = SectionScanner::new('%', "end", NESTED);
        for token in ["%geom", "Constraints", "{B", "0", "1", "C}"] {
            assert!(scanner.feed(token).is_none());
        }
        assert!(scanner.feed("end").is_none(), "single end must not close the section");
        let section = scanner.feed("end").expect("second end closes the section");
        assert_eq!(section.name, "geom");
        assert_eq!(section.body, "Constraints {B 0 1 C} end");
    }

    #[test]
    fn test_tokens_outside_sections_are_collected() {
        let (sections, leftovers) = scan("stray words %scf maxiter 100 END");
        assert_eq!(sections.len(), 1);
        assert_eq!(leftovers.ignored, vec!["stray", "words"]);
    }

    #[test]
    fn test_bare_marker_takes_next_token_as_name() {
        let (sections, _) = scan("% PAL nprocs 2 end");
        assert_eq!(sections[0].name, "pal");
        assert_eq!(sections[0].body, "nprocs 2");
    }

    #[test]
    fn test_unterminated_section_is_reported() {
        let (sections, leftovers) = scan("%method maxcore 100");
        assert!(sections.is_empty());
        assert_eq!(leftovers.unterminated.as_deref(), Some("method"));
    }
}

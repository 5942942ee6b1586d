use std::fmt;

/// Where a non-fatal diagnostic came from.
///
/// The origin is shown next to the message so the user can tell whether a
/// discarded value stems from the input file, a directive or the
/// consistency checks on the final resource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced while scanning the body of the input file.
    InputFile,
    /// Produced while interpreting a directive comment line.
    Directive,
    /// Produced while finalizing the resource request.
    Resources,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::InputFile => write!(f, "input file"),
            Origin::Directive => write!(f, "directive"),
            Origin::Resources => write!(f, "resources"),
        }
    }
}

/// A single warn-and-continue condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub origin: Origin,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.origin, self.message)
    }
}

/// Ordered list of diagnostics, in the order they were raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, origin: Origin, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            origin,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// True if any collected message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|d| d.message.contains(needle))
    }
}

/// Decides how collected diagnostics reach the user.
pub trait DiagnosticReporter {
    fn report(&self, diagnostics: &Diagnostics);
}

/// Forwards every diagnostic to the log as a warning.
///
/// The subscriber writes to stderr, so the generated script on stdout is
/// never interleaved with warnings.
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticReporter for ConsoleReporter {
    fn report(&self, diagnostics: &Diagnostics) {
        for diagnostic in diagnostics.iter() {
            tracing::warn!(origin = %diagnostic.origin, "{}", diagnostic.message);
        }
        if !diagnostics.is_empty() {
            tracing::debug!("{} warning(s) while building the job script", diagnostics.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_keep_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(Origin::InputFile, "first");
        diagnostics.warn(Origin::Directive, "second");

        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert!(diagnostics.mentions("sec"));
        assert_eq!(
            diagnostics.iter().last().unwrap().to_string(),
            "[directive] second"
        );
    }
}

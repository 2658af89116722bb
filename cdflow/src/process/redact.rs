//! Credential masking and shell quoting.

use regex::Regex;
use std::borrow::Cow;

/// Replacement text for a masked credential.
pub const MASK: &str = "****";

/// How secrets are found in text.
#[derive(Debug, Clone, Default)]
enum Matcher {
    #[default]
    Inactive,
    Pattern(Regex),
    /// Longest first.
    Literals(Vec<String>),
}

/// Masks credential values in command lines and captured output.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    matcher: Matcher,
}

impl Redactor {
    /// Builds a redactor for the given secret values.
    ///
    /// Empty values are ignored. Longer secrets are matched first so a secret
    /// that contains another is masked whole.
    #[must_use]
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();

        if secrets.is_empty() {
            return Self::default();
        }

        let alternation = secrets
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&alternation) {
            Ok(pattern) => Self {
                matcher: Matcher::Pattern(pattern),
            },
            Err(e) => {
                tracing::warn!(count = secrets.len(), error = %e, "Redaction pattern rejected; masking literally");
                Self::literal(secrets)
            }
        }
    }

    /// Masks each secret with plain substring replacement, longest first.
    fn literal(secrets: Vec<String>) -> Self {
        Self {
            matcher: Matcher::Literals(secrets),
        }
    }

    /// Returns true if the redactor masks anything.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.matcher, Matcher::Inactive)
    }

    /// Masks every credential occurrence in `text`.
    #[must_use]
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.matcher {
            Matcher::Inactive => Cow::Borrowed(text),
            Matcher::Pattern(pattern) => pattern.replace_all(text, MASK),
            Matcher::Literals(secrets) => {
                let mut masked = Cow::Borrowed(text);
                for secret in secrets {
                    if masked.contains(secret.as_str()) {
                        masked = Cow::Owned(masked.replace(secret.as_str(), MASK));
                    }
                }
                masked
            }
        }
    }
}

/// Quotes a value for safe interpolation into a POSIX shell command line.
///
/// Values made only of characters the shell never interprets are returned
/// unchanged.
#[must_use]
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));

    if plain {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', "'\\''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_fallback_masks() {
        let redactor = Redactor::literal(vec!["s3cr3t-long".to_string(), "s3cr3t".to_string()]);

        assert!(redactor.is_active());
        assert_eq!(
            redactor.redact("a=s3cr3t-long b=s3cr3t c=x"),
            "a=**** b=**** c=x"
        );
        assert!(matches!(redactor.redact("nothing here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_redacts_all_occurrences() {
        let redactor = Redactor::new(["s3cr3t", "tok.en"]);

        let text = "login s3cr3t then tok.en and s3cr3t again; token stays";
        assert_eq!(
            redactor.redact(text),
            "login **** then **** and **** again; token stays"
        );
    }

    #[test]
    fn test_longer_secret_wins() {
        let redactor = Redactor::new(["abc", "abcdef"]);
        assert_eq!(redactor.redact("xabcdefx"), "x****x");
    }

    #[test]
    fn test_empty_redactor_borrows() {
        let redactor = Redactor::new(Vec::<String>::new());
        assert!(!redactor.is_active());
        assert!(matches!(redactor.redact("plain"), Cow::Borrowed("plain")));

        let redactor = Redactor::new([""]);
        assert!(!redactor.is_active());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("https://github.com/a/b.git"), "https://github.com/a/b.git");
        assert_eq!(shell_quote("main"), "main");
        assert_eq!(shell_quote("my branch"), "'my branch'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}

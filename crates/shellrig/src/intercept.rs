//! Interactive prompt interception.
//!
//! An [`Interceptor`] recognizes an interactive sub-prompt mid-output (pager
//! banners, confirmation questions, password prompts) and supplies an
//! automatic response, letting the read engine answer dialogs without a
//! human in the loop. Caller-supplied rules take priority over the two
//! built-ins ([`more`] and [`press_any_key`]), which stay active as a
//! fallback tier.
//!
//! The matching granularity is part of the rule, not the engine: a rule's
//! [`Scope`] decides whether it sees the full accumulated buffer, only the
//! trimmed last line, or whitespace-trimmed text.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::Result;

/// Pattern for the conventional `[y/n]`-shaped confirmation prompt.
pub const OPTION_PROMPT_PATTERN: &str = r"(?i)[\[(]y(es)?[/|]no?[\])][?:]\s*$";

/// Pattern for a flexible `[opt1/opt2/...]`-shaped option prompt.
pub const FLEXIBLE_OPTION_PROMPT_PATTERN: &str = r"(?i)[\[(][a-z]+([/|][a-z\[\]]+)+[\])][?:]\s*$";

static MORE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    // Tolerates percentage indicators and surrounding parens/dashes, e.g.
    // `---- More ----`, `--More (23%)--`. Some devices append a carriage
    // return to clear the banner; match it so it is consumed too.
    Regex::new(r"(?i)^\s*-{2,}\s*(\(?\s*)?more(\s+\d+%\s*\)?)?\s*-{2,}(\s\r)?").expect("valid pattern")
});

static CONTINUE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*press\s+any\s+key\s+to\s+continue(\s\r)?").expect("valid pattern")
});

static OPTION_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(OPTION_PROMPT_PATTERN).expect("valid pattern"));

static FLEXIBLE_OPTION_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FLEXIBLE_OPTION_PROMPT_PATTERN).expect("valid pattern"));

/// The response produced by a matching interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Whether the matched output should still be revealed to the caller.
    pub show_output: bool,
    /// Bytes to write to the input stream, verbatim.
    pub response: String,
}

/// A rule that recognizes an interactive sub-prompt and answers it.
pub trait Interceptor: Send + Sync {
    /// Evaluate the accumulated text; `Some` means the rule matched.
    fn intercept(&self, text: &str) -> Option<Reply>;
}

impl<F> Interceptor for F
where
    F: Fn(&str) -> Option<Reply> + Send + Sync,
{
    fn intercept(&self, text: &str) -> Option<Reply> {
        self(text)
    }
}

/// Which view of the accumulated output a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The full accumulated multi-line buffer.
    #[default]
    Buffer,
    /// The last line, with trailing whitespace removed.
    LastLine,
    /// The buffer with surrounding whitespace removed.
    Trimmed,
}

impl Scope {
    fn apply<'a>(self, text: &'a str) -> &'a str {
        match self {
            Self::Buffer => text,
            Self::LastLine => last_line(text),
            Self::Trimmed => text.trim(),
        }
    }
}

/// The last line of `text` after trailing whitespace is removed.
pub(crate) fn last_line(text: &str) -> &str {
    let text = text.trim_end();
    match text.rfind('\n') {
        Some(i) => &text[i + 1..],
        None => text,
    }
}

/// Append a trailing newline unless one is already present; empty input
/// becomes a bare newline.
pub(crate) fn append_newline(s: &str) -> String {
    if s.is_empty() {
        return "\n".to_string();
    }
    if s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{s}\n")
    }
}

struct RegexRule {
    regex: Regex,
    scope: Scope,
    show_output: bool,
    response: String,
}

impl Interceptor for RegexRule {
    fn intercept(&self, text: &str) -> Option<Reply> {
        self.regex.is_match(self.scope.apply(text)).then(|| Reply {
            show_output: self.show_output,
            response: self.response.clone(),
        })
    }
}

/// A rule from an already-compiled regex. The response is written verbatim.
#[must_use]
pub fn regex_rule(
    regex: Regex,
    response: impl Into<String>,
    scope: Scope,
    show_output: bool,
) -> Arc<dyn Interceptor> {
    Arc::new(RegexRule {
        regex,
        scope,
        show_output,
        response: response.into(),
    })
}

/// A rule from a pattern string; compilation errors are reported here, at
/// construction, never at match time.
pub fn pattern(
    pattern: &str,
    response: impl Into<String>,
    scope: Scope,
    show_output: bool,
) -> Result<Arc<dyn Interceptor>> {
    Ok(regex_rule(Regex::new(pattern)?, response, scope, show_output))
}

/// A rule matched against the trimmed last line only.
pub fn last_line_pattern(
    pat: &str,
    response: impl Into<String>,
    show_output: bool,
) -> Result<Arc<dyn Interceptor>> {
    pattern(pat, response, Scope::LastLine, show_output)
}

/// Answer a password prompt. The secret gets a trailing newline; output is
/// matched with surrounding whitespace trimmed.
pub fn password(pat: &str, secret: &str, show_output: bool) -> Result<Arc<dyn Interceptor>> {
    pattern(pat, append_newline(secret), Scope::Trimmed, show_output)
}

/// Answer a password prompt matched against the trimmed last line.
pub fn last_line_password(pat: &str, secret: &str, show_output: bool) -> Result<Arc<dyn Interceptor>> {
    pattern(pat, append_newline(secret), Scope::LastLine, show_output)
}

/// Built-in pager continuation: answers a `-- more --` banner with a space.
/// Output hidden.
#[must_use]
pub fn more() -> Arc<dyn Interceptor> {
    regex_rule(MORE_PROMPT.clone(), " ", Scope::LastLine, false)
}

/// Built-in continuation prompt: answers `press any key to continue` with a
/// space. Output hidden.
#[must_use]
pub fn press_any_key() -> Arc<dyn Interceptor> {
    regex_rule(CONTINUE_PROMPT.clone(), " ", Scope::LastLine, false)
}

/// Always answer `y` to a `[y/n]`-shaped prompt.
#[must_use]
pub fn always_yes(show_output: bool) -> Arc<dyn Interceptor> {
    regex_rule(OPTION_PROMPT.clone(), append_newline("y"), Scope::LastLine, show_output)
}

/// Always answer `n` to a `[y/n]`-shaped prompt.
#[must_use]
pub fn always_no(show_output: bool) -> Arc<dyn Interceptor> {
    regex_rule(OPTION_PROMPT.clone(), append_newline("n"), Scope::LastLine, show_output)
}

/// Answer a `[opt1/opt2/...]`-shaped prompt by option index.
///
/// Options split on `/` or `|`; a `[...]` marker around an optional choice
/// is trimmed. An out-of-range index answers with a bare newline.
#[must_use]
pub fn answer_option(index: usize, show_output: bool) -> Arc<dyn Interceptor> {
    Arc::new(move |text: &str| {
        let line = last_line(text);
        if !FLEXIBLE_OPTION_PROMPT.is_match(line) {
            return None;
        }

        let mut options = line;
        if let Some(i) = options.find(['[', '(']) {
            options = &options[i + 1..];
        }
        if let Some(i) = options.find([']', ')']) {
            options = &options[..i];
        }
        let choice = options
            .split(['/', '|'])
            .map(|s| s.trim().trim_start_matches('[').trim_end_matches(']'))
            .nth(index)
            .unwrap_or("");

        Some(Reply {
            show_output,
            response: append_newline(choice.trim()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(rule: &Arc<dyn Interceptor>, text: &str) -> Option<Reply> {
        rule.intercept(text)
    }

    #[test]
    fn more_banner_variants() {
        let rule = more();
        for text in [
            "---- More ----",
            "--More--",
            "---- more 10% ----",
            "--(more 34%)--",
            "some output\n ---- More ---- ",
        ] {
            let rep = reply(&rule, text).expect(text);
            assert_eq!(rep.response, " ");
            assert!(!rep.show_output);
        }
        assert!(reply(&rule, "no banner here").is_none());
        assert!(reply(&rule, "- more -").is_none());
    }

    #[test]
    fn press_any_key_matches() {
        let rule = press_any_key();
        assert!(reply(&rule, "Press any key to continue").is_some());
        assert!(reply(&rule, "output\npress ANY key to continue ...").is_some());
        assert!(reply(&rule, "press a key").is_none());
    }

    #[test]
    fn yes_no_prompts() {
        let yes = always_yes(false);
        let rep = reply(&yes, "Are you sure? [Y/N]:").unwrap();
        assert_eq!(rep.response, "y\n");
        assert!(reply(&yes, "Save config? (yes/no)?").is_some());
        assert!(reply(&yes, "anything else").is_none());

        let no = always_no(false);
        assert_eq!(reply(&no, "Continue? [y/n]:").unwrap().response, "n\n");
    }

    #[test]
    fn option_prompt_by_index() {
        let rule = answer_option(2, false);
        let rep = reply(&rule, "Overwrite? [yes/no/fingerprint]:").unwrap();
        assert_eq!(rep.response, "fingerprint\n");

        // Optional choices keep their own bracket markers.
        let rep = reply(&rule, "Choose (a|b|[c]):").unwrap();
        assert_eq!(rep.response, "c\n");

        // Out of range answers with a bare newline.
        let rule = answer_option(9, false);
        let rep = reply(&rule, "Choose [a/b]:").unwrap();
        assert_eq!(rep.response, "\n");
    }

    #[test]
    fn password_appends_newline() {
        let rule = password(r"(?i)password:\s*$", "s3cret", false).unwrap();
        let rep = reply(&rule, "  Password: ").unwrap();
        assert_eq!(rep.response, "s3cret\n");
    }

    #[test]
    fn malformed_pattern_fails_at_construction() {
        let Err(err) = pattern("(unclosed", "x", Scope::Buffer, false) else {
            panic!("malformed pattern must not compile");
        };
        assert_eq!(err.op(), "pattern");
    }

    #[test]
    fn last_line_scope_ignores_history() {
        let rule = last_line_pattern(r"^Continue\?$", "ok", false).unwrap();
        assert!(reply(&rule, "Continue?\ndone").is_none());
        assert!(reply(&rule, "done\nContinue?  ").is_some());
    }

    #[test]
    fn closures_are_interceptors() {
        let rule = |text: &str| {
            text.contains("token").then(|| Reply {
                show_output: true,
                response: "abc\n".into(),
            })
        };
        assert!(rule.intercept("enter token now").is_some());
        assert!(rule.intercept("nothing").is_none());
    }
}

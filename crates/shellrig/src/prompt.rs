//! End-of-output prompt detection.
//!
//! Prompt formats are unconstrained across vendors: `[root@host ~]#`,
//! `hostname(config)#`, `HRP_M<FW-A>`, truncated forms like
//! `S-ABC-D1-EFG-~(M)#`, and everything in between. The default detector is
//! a generic tail-character heuristic with guards against the known false
//! positives; the hostname-extraction heuristic derives a tighter matcher
//! from the first match so the engine can track prompts that change shape
//! mid-session (entering a configuration sub-mode, switching users).
//!
//! Callers with known, static prompts should supply an explicit matcher
//! list and leave auto-correction off; the heuristic is best-effort and
//! occasionally wrong.

use std::sync::LazyLock;

use regex::Regex;

use crate::intercept::FLEXIBLE_OPTION_PROMPT_PATTERN;

/// Characters that conventionally terminate a prompt, as a regex class body.
pub const PROMPT_TAIL_CHARS: &str = r"$#%>\]:~";

/// The generic prompt tail: anything ending in a prompt-terminator
/// character plus optional whitespace.
pub const PROMPT_SUFFIX_PATTERN: &str = r".*[$#%>\]:~]\s*$";

static DEFAULT_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+.*[$#%>\]:~]\s*$").expect("valid pattern"));

// Known false positives of the tail heuristic: lines like
// `[user@host ~]$ Username:` end in a tail character but are interactive
// prompts, not end-of-output.
static USERNAME_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i).*(login|user(name)?):\s*$").expect("valid pattern"));
static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i).*pass(word)?:\s*$").expect("valid pattern"));
static OPTION_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FLEXIBLE_OPTION_PROMPT_PATTERN).expect("valid pattern"));

/// An end-of-output prompt detection strategy.
///
/// Alternative or learned detectors substitute here without touching the
/// read engine.
pub trait PromptMatcher: Send + Sync {
    /// Whether `text` looks like an end-of-output prompt.
    fn matches(&self, text: &str) -> bool;

    /// Derive a corrected, session-specific matcher from a matched prompt.
    fn derive(&self, text: &str) -> Option<Regex> {
        let _ = text;
        None
    }
}

/// The default heuristic detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompt;

impl PromptMatcher for DefaultPrompt {
    fn matches(&self, text: &str) -> bool {
        DEFAULT_PROMPT.is_match(text)
            && !USERNAME_PROMPT.is_match(text)
            && !PASSWORD_PROMPT.is_match(text)
            && !OPTION_PROMPT.is_match(text)
    }

    fn derive(&self, text: &str) -> Option<Regex> {
        derive_prompt_regex(text)
    }
}

/// Extract a probable hostname token from a matched prompt line.
///
/// Trims trailing prompt terminators and whitespace, then narrows: after
/// `@` (strip the user), before `.` (strip a domain), before whitespace or
/// `~` (strip a working directory), and inside one layer of enclosing
/// bracket markers.
#[must_use]
pub fn find_hostname(text: &str) -> Option<String> {
    let mut s = text
        .trim()
        .trim_end_matches(['$', '#', '%', '>', ']', ':', '~'])
        .trim();
    if let Some(i) = s.find('@') {
        s = &s[i + 1..];
    }
    if let Some(i) = s.find('.') {
        s = &s[..i];
    }
    if let Some(i) = s.find(|c: char| c.is_whitespace() || c == '~') {
        s = &s[..i];
    }
    if let Some(i) = s.find(['<', '(', '[']) {
        s = &s[i + 1..];
    }
    if let Some(i) = s.find(['>', ')', ']']) {
        s = &s[..i];
    }
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Build a corrected end-prompt matcher from a matched prompt line.
///
/// The pattern anchors on the extracted hostname followed by the generic
/// prompt tail, case-insensitively. Hostnames longer than ten characters
/// also accept a ten-character prefix plus wildcard, for vendors that
/// truncate long hostnames in the prompt.
#[must_use]
pub fn derive_prompt_regex(text: &str) -> Option<Regex> {
    let hostname = find_hostname(text)?;
    let chars: Vec<char> = hostname.chars().collect();
    let prefix: Option<String> = (chars.len() > 10).then(|| chars[..10].iter().collect());

    if let Ok(re) = Regex::new(&prompt_pattern(&hostname, prefix.as_deref())) {
        return Some(re);
    }

    // The hostname may contain regex metacharacters; retry escaped.
    let escaped = prompt_pattern(
        &regex::escape(&hostname),
        prefix.map(|p| regex::escape(&p)).as_deref(),
    );
    match Regex::new(&escaped) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!(prompt = text, error = %err, "prompt matcher derivation failed");
            None
        }
    }
}

fn prompt_pattern(hostname: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!(r"(?i)({hostname}|{prefix}\S*){PROMPT_SUFFIX_PATTERN}"),
        None => format!(r"(?i){hostname}{PROMPT_SUFFIX_PATTERN}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_shapes() {
        let matcher = DefaultPrompt;
        for prompt in [
            "[root@localhost ~]#",
            "[root@192.168.1.24 /home/admin]$ ",
            "hostname#",
            "hostname(config)#",
            "HRP_M<FW-A> ",
            "S-ABC-D1-EFG-~(M)#",
            "admin@gateway:~",
        ] {
            assert!(matcher.matches(prompt), "{prompt}");
        }
        assert!(!matcher.matches("plain output"));
        assert!(!matcher.matches("   "));
    }

    #[test]
    fn interactive_prompts_are_not_end_prompts() {
        let matcher = DefaultPrompt;
        assert!(!matcher.matches("[testuser@localhost ~]$ Username:"));
        assert!(!matcher.matches("login:"));
        assert!(!matcher.matches("Password:"));
        assert!(!matcher.matches("Overwrite? [yes/no]:"));
    }

    #[test]
    fn hostname_extraction() {
        assert_eq!(find_hostname("[root@localhost ~]#").as_deref(), Some("localhost"));
        assert_eq!(
            find_hostname("[root@localhost.localdomain ~]$").as_deref(),
            Some("localhost")
        );
        assert_eq!(find_hostname("switch-01#").as_deref(), Some("switch-01"));
        assert_eq!(find_hostname("HRP_M<HUAWEI>").as_deref(), Some("HUAWEI"));
        assert_eq!(find_hostname("[USG6000V1]").as_deref(), Some("USG6000V1"));
        assert_eq!(find_hostname("admin@gateway:~").as_deref(), Some("gateway"));
        assert_eq!(find_hostname("中文主机名 #").as_deref(), Some("中文主机名"));
        assert_eq!(find_hostname("# "), None);
    }

    #[test]
    fn derived_matcher_tracks_sub_modes() {
        let re = derive_prompt_regex("switch-01#").unwrap();
        assert!(re.is_match("switch-01#"));
        assert!(re.is_match("switch-01(config)#"));
        assert!(re.is_match("SWITCH-01(config-if)# "));
        assert!(!re.is_match("other-host#"));
    }

    #[test]
    fn long_hostname_accepts_truncated_prefix() {
        let re = derive_prompt_regex("S-ABC-D1-EFG-LONGNAME#").unwrap();
        assert!(re.is_match("S-ABC-D1-EFG-LONGNAME#"));
        // Vendors may truncate: the first ten characters plus wildcard.
        assert!(re.is_match("S-ABC-D1-E~(M)#"));
    }

    #[test]
    fn metacharacter_hostname_falls_back_to_escaped() {
        // `(?i)*host...` is not a valid pattern; the escaped retry is.
        let re = derive_prompt_regex("*host#").unwrap();
        assert!(re.is_match("*host#"));
    }
}

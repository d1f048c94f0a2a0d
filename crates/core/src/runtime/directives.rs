//! Inline directive parser: `/think`, `/model`, `/reset`,
//! `/status`, `/help` lines are stripped out of the user message before it
//! reaches the LLM. If stripping empties the message, the Chat Loop treats
//! the turn as directives-only and skips the LLM call entirely.

use crate::runtime::runtime_config::ThinkingLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Think(ThinkingLevel),
    Model(String),
    Reset,
    Status,
    Help,
}

/// A directive line that didn't parse into anything recognized. Kept
/// separate from a hard error: the line is still stripped from the message
/// (it looked like a directive), but the caller can surface a `warning`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDirective {
    pub raw: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub directives: Vec<Directive>,
    pub unknown: Vec<UnknownDirective>,
    pub remaining: String,
}

impl ParsedMessage {
    /// True once directives are stripped and nothing but whitespace is left.
    pub fn is_directives_only(&self) -> bool {
        self.remaining.trim().is_empty() && (!self.directives.is_empty() || !self.unknown.is_empty())
    }
}

fn parse_think(arg: &str) -> Option<ThinkingLevel> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "off" => Some(ThinkingLevel::Off),
        "low" => Some(ThinkingLevel::Low),
        "medium" | "med" => Some(ThinkingLevel::Medium),
        "high" => Some(ThinkingLevel::High),
        _ => None,
    }
}

fn parse_line(line: &str) -> Option<Result<Directive, UnknownDirective>> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    let directive = match command {
        "think" => parse_think(arg).map(Directive::Think),
        "model" if !arg.is_empty() => Some(Directive::Model(arg.to_string())),
        "reset" => Some(Directive::Reset),
        "status" => Some(Directive::Status),
        "help" => Some(Directive::Help),
        _ => None,
    };

    match directive {
        Some(d) => Some(Ok(d)),
        None => Some(Err(UnknownDirective {
            raw: trimmed.to_string(),
        })),
    }
}

/// Parse directives out of `input`, line by line. A line is treated as a
/// directive candidate only if it starts with `/` once trimmed; every other
/// line is kept verbatim in `remaining`.
pub fn parse(input: &str) -> ParsedMessage {
    let mut parsed = ParsedMessage::default();
    let mut kept_lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('/') {
            match parse_line(line) {
                Some(Ok(directive)) => parsed.directives.push(directive),
                Some(Err(unknown)) => parsed.unknown.push(unknown),
                None => kept_lines.push(line),
            }
        } else {
            kept_lines.push(line);
        }
    }

    parsed.remaining = kept_lines.join("\n").trim().to_string();
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_has_no_directives() {
        let parsed = parse("hello there");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.remaining, "hello there");
        assert!(!parsed.is_directives_only());
    }

    #[test]
    fn think_directive_parses_level() {
        let parsed = parse("/think low");
        assert_eq!(parsed.directives, vec![Directive::Think(ThinkingLevel::Low)]);
        assert!(parsed.is_directives_only());
    }

    #[test]
    fn model_directive_captures_provider_slash_name() {
        let parsed = parse("/model openai/gpt-4o-mini");
        assert_eq!(
            parsed.directives,
            vec![Directive::Model("openai/gpt-4o-mini".into())]
        );
    }

    #[test]
    fn reset_status_help_parse() {
        assert_eq!(parse("/reset").directives, vec![Directive::Reset]);
        assert_eq!(parse("/status").directives, vec![Directive::Status]);
        assert_eq!(parse("/help").directives, vec![Directive::Help]);
    }

    #[test]
    fn directive_plus_text_keeps_remaining_message() {
        let parsed = parse("/think high\nplease dig into this bug");
        assert_eq!(parsed.directives, vec![Directive::Think(ThinkingLevel::High)]);
        assert_eq!(parsed.remaining, "please dig into this bug");
        assert!(!parsed.is_directives_only());
    }

    #[test]
    fn unknown_directive_is_stripped_but_flagged() {
        let parsed = parse("/bogus thing");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.unknown.len(), 1);
        assert_eq!(parsed.unknown[0].raw, "/bogus thing");
        assert!(parsed.is_directives_only());
    }

    #[test]
    fn model_without_arg_is_unknown() {
        let parsed = parse("/model");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.unknown.len(), 1);
    }

    #[test]
    fn whitespace_only_message_is_not_directives_only() {
        let parsed = parse("   \n  ");
        assert!(!parsed.is_directives_only());
        assert!(parsed.remaining.is_empty());
    }

    #[test]
    fn think_with_invalid_level_is_unknown() {
        let parsed = parse("/think extreme");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.unknown.len(), 1);
    }
}

//! Proposal parser
//!
//! Turns raw model text into a typed [`Proposal`]. Two independent paths:
//!
//! * the strict line-tagged format (`REASONING_TYPE:`, `THOUGHT_PROCESS:`,
//!   `VERIFICATION:`, `ACTION:`, `CONFIDENCE:`, `ERROR_CHECK:`), and
//! * a fallback scan used when no `ACTION:` line is present, which recovers
//!   an action clause from prose.
//!
//! A `VERIFICATION:` line sets `needs_verification` purely because it is
//! present. Models fill it in when they want the result checked, so its
//! presence is read as a verification request.

use crate::error::AgentError;
use crate::models::{Proposal, ReasoningCategory, ANSWER_KEYWORD, CALL_KEYWORD};
use crate::Result;
use tracing::debug;

const LEGACY_CALL: &str = "FUNCTION_CALL:";
const LEGACY_ANSWER: &str = "FINAL_ANSWER:";

const DEFAULT_RATIONALE: &str = "No explicit reasoning provided";
/// Used when the model omits `CONFIDENCE:`
const DEFAULT_CONFIDENCE: f64 = 0.8;
/// Used when `CONFIDENCE:` is present but unreadable
const UNREADABLE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    ReasoningType,
    ThoughtProcess,
    Verification,
    Action,
    Confidence,
    ErrorCheck,
}

impl Tag {
    fn from_label(label: &str) -> Option<Self> {
        let label = label
            .trim()
            .trim_matches(|c: char| c == '*' || c == '#' || c == '-' || c.is_whitespace())
            .to_uppercase()
            .replace(' ', "_");

        match label.as_str() {
            "REASONING_TYPE" => Some(Tag::ReasoningType),
            "THOUGHT_PROCESS" => Some(Tag::ThoughtProcess),
            "VERIFICATION" => Some(Tag::Verification),
            "ACTION" => Some(Tag::Action),
            "CONFIDENCE" => Some(Tag::Confidence),
            "ERROR_CHECK" => Some(Tag::ErrorCheck),
            _ => None,
        }
    }
}

/// Fields collected from tagged lines
#[derive(Debug, Default)]
struct TaggedFields {
    category: Option<ReasoningCategory>,
    thought: Vec<String>,
    verification: Option<String>,
    action: Option<String>,
    confidence: Option<f64>,
    error_flag: bool,
}

impl TaggedFields {
    fn into_proposal(self, candidate_action: String) -> Proposal {
        let mut rationale = self.thought.join(" ");
        if let Some(verification) = &self.verification {
            rationale.push_str(&format!(" | Verification: {}", verification));
        }
        let rationale = rationale.trim().to_string();

        Proposal {
            reasoning_category: self.category.unwrap_or_default(),
            rationale: if rationale.is_empty() {
                DEFAULT_RATIONALE.to_string()
            } else {
                rationale
            },
            candidate_action,
            confidence: self.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            needs_verification: self.verification.is_some(),
            error_flag: self.error_flag,
        }
    }
}

/// Parser bound to a tool catalogue
#[derive(Debug, Clone, Default)]
pub struct ProposalParser {
    tool_names: Vec<String>,
}

impl ProposalParser {
    pub fn new<I, S>(tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool_names: tool_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Strict path first, then the fallback scan. Fails only when neither finds an action.
    pub fn parse(&self, raw: &str) -> Result<Proposal> {
        let fields = collect_tagged(raw);

        if let Some(action) = fields.action.clone() {
            return Ok(fields.into_proposal(action));
        }

        match self.fallback_action(raw) {
            Some(action) => {
                debug!(action = %action, "Recovered action from untagged text");
                Ok(fields.into_proposal(action))
            }
            None => Err(AgentError::Parse(format!(
                "no action clause found in model output: {}",
                preview(raw)
            ))),
        }
    }

    /// Strict line-tagged format only; `None` when there is no usable `ACTION:` line
    pub fn parse_tagged(&self, raw: &str) -> Option<Proposal> {
        let fields = collect_tagged(raw);
        let action = fields.action.clone()?;
        Some(fields.into_proposal(action))
    }

    /// Scan lines in order; the first line holding a call or an answer wins
    pub fn fallback_action(&self, raw: &str) -> Option<String> {
        non_blank_lines(raw).find_map(|line| self.recognize_line(line))
    }

    fn recognize_line(&self, line: &str) -> Option<String> {
        after_marker(line, LEGACY_CALL)
            .map(|rest| format!("{} {}", CALL_KEYWORD, rest))
            .or_else(|| {
                after_marker(line, LEGACY_ANSWER)
                    .map(|rest| format!("{} {}", ANSWER_KEYWORD, rest))
            })
            .or_else(|| leading_keyword(line))
            .or_else(|| self.known_tool_call(line))
    }

    /// `<known tool>|...` anywhere in the line
    fn known_tool_call(&self, line: &str) -> Option<String> {
        self.tool_names.iter().find_map(|name| {
            let needle = format!("{}|", name);
            line.match_indices(&needle).find_map(|(idx, _)| {
                let boundary = line[..idx]
                    .chars()
                    .next_back()
                    .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
                boundary.then(|| {
                    let clause = line[idx..].trim().trim_end_matches(['.', '`', '"']);
                    format!("{} {}", CALL_KEYWORD, clause)
                })
            })
        })
    }
}

fn collect_tagged(raw: &str) -> TaggedFields {
    let mut fields = TaggedFields::default();
    let mut current: Option<Tag> = None;

    for line in non_blank_lines(raw) {
        let tagged = line
            .split_once(':')
            .and_then(|(label, value)| Tag::from_label(label).map(|tag| (tag, value.trim())));

        let Some((tag, value)) = tagged else {
            // Continuation of a multi-line thought
            if current == Some(Tag::ThoughtProcess) {
                fields.thought.push(line.to_string());
            }
            continue;
        };

        current = Some(tag);
        match tag {
            Tag::ReasoningType => fields.category = Some(ReasoningCategory::from_token(value)),
            Tag::ThoughtProcess => {
                if !value.is_empty() {
                    fields.thought.push(value.to_string());
                }
            }
            Tag::Verification => fields.verification = Some(value.to_string()),
            Tag::Action => {
                if fields.action.is_none() {
                    fields.action = canonical_action(value);
                }
            }
            Tag::Confidence => fields.confidence = Some(parse_confidence(value)),
            Tag::ErrorCheck => fields.error_flag = parse_error_check(value),
        }
    }

    fields
}

/// Normalize the text of an `ACTION:` line to `CALL ...` or `ANSWER ...`
fn canonical_action(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('`').trim();
    if value.is_empty() {
        return None;
    }

    if let Some(rest) = after_marker(value, LEGACY_CALL) {
        return Some(format!("{} {}", CALL_KEYWORD, rest));
    }
    if let Some(rest) = after_marker(value, LEGACY_ANSWER) {
        return Some(format!("{} {}", ANSWER_KEYWORD, rest));
    }
    if let Some(clause) = leading_keyword(value) {
        return Some(clause);
    }

    if value.contains('|') {
        Some(format!("{} {}", CALL_KEYWORD, value))
    } else {
        Some(format!("{} {}", ANSWER_KEYWORD, value))
    }
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|idx| line[idx + marker.len()..].trim())
}

/// A line that already starts with `CALL ` or `ANSWER ` (any case)
fn leading_keyword(line: &str) -> Option<String> {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    if head.eq_ignore_ascii_case(CALL_KEYWORD) && !rest.is_empty() {
        Some(format!("{} {}", CALL_KEYWORD, rest))
    } else if head.eq_ignore_ascii_case(ANSWER_KEYWORD) {
        Some(format!("{} {}", ANSWER_KEYWORD, rest).trim_end().to_string())
    } else {
        None
    }
}

fn parse_confidence(value: &str) -> f64 {
    let token = value.split_whitespace().next().unwrap_or_default();
    let token = token.trim_matches(|c: char| c == '[' || c == ']' || c == ',');

    let parsed = match token.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().map(|p| p / 100.0),
        None => token.parse::<f64>(),
    };

    match parsed {
        Ok(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => UNREADABLE_CONFIDENCE,
    }
}

fn parse_error_check(value: &str) -> bool {
    let token = value
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    matches!(token.as_str(), "true" | "yes" | "1")
}

fn non_blank_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn preview(raw: &str) -> String {
    let text: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        format!("{}...", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ProposalParser {
        ProposalParser::new(["add", "subtract", "add_list"])
    }

    #[test]
    fn test_tagged_call() {
        let raw = "REASONING_TYPE: ARITHMETIC\n\
                   THOUGHT_PROCESS: Need to add 5 and 3.\n\
                   ACTION: CALL add|5|3\n\
                   CONFIDENCE: 1.0\n\
                   ERROR_CHECK: false";

        let proposal = parser().parse(raw).unwrap();
        assert_eq!(proposal.reasoning_category, ReasoningCategory::Arithmetic);
        assert_eq!(proposal.candidate_action, "CALL add|5|3");
        assert_eq!(proposal.rationale, "Need to add 5 and 3.");
        assert_eq!(proposal.confidence, 1.0);
        assert!(!proposal.needs_verification);
        assert!(!proposal.error_flag);
    }

    #[test]
    fn test_tagged_action_is_verbatim() {
        for action in ["CALL add|5|3", "ANSWER 8", "CALL add_list|[1, 2, 3]"] {
            let raw = format!("ACTION: {}\nCONFIDENCE: 0.9", action);
            let proposal = parser().parse_tagged(&raw).unwrap();
            assert_eq!(proposal.candidate_action, action);
        }
    }

    #[test]
    fn test_legacy_markers_canonicalized() {
        let call = parser().parse("ACTION: FUNCTION_CALL: add|5|3").unwrap();
        assert_eq!(call.candidate_action, "CALL add|5|3");

        let answer = parser().parse("ACTION: FINAL_ANSWER: 8").unwrap();
        assert_eq!(answer.candidate_action, "ANSWER 8");
    }

    #[test]
    fn test_unprefixed_action_shape() {
        assert_eq!(
            parser().parse("ACTION: subtract|9|4").unwrap().candidate_action,
            "CALL subtract|9|4"
        );
        assert_eq!(parser().parse("ACTION: 42").unwrap().candidate_action, "ANSWER 42");
    }

    #[test]
    fn test_verification_sets_flag_and_extends_rationale() {
        let raw = "THOUGHT_PROCESS: Adding.\nVERIFICATION: Expect 8\nACTION: CALL add|5|3";
        let proposal = parser().parse(raw).unwrap();
        assert!(proposal.needs_verification);
        assert_eq!(proposal.rationale, "Adding. | Verification: Expect 8");
    }

    #[test]
    fn test_unknown_category_defaults_to_logic() {
        let proposal = parser().parse("REASONING_TYPE: GUESSWORK\nACTION: ANSWER 1").unwrap();
        assert_eq!(proposal.reasoning_category, ReasoningCategory::Logic);
    }

    #[test]
    fn test_confidence_handling() {
        assert_eq!(parse_confidence("0.75"), 0.75);
        assert_eq!(parse_confidence("85%"), 0.85);
        assert_eq!(parse_confidence("7"), 1.0);
        assert_eq!(parse_confidence("-2"), 0.0);
        assert_eq!(parse_confidence("high"), UNREADABLE_CONFIDENCE);
        assert_eq!(parse_confidence("NaN"), UNREADABLE_CONFIDENCE);

        let missing = parser().parse("ACTION: ANSWER 1").unwrap();
        assert_eq!(missing.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        let raw = "action: CALL add|1|2\nConfidence: 0.4\nerror_check: yes";
        let proposal = parser().parse(raw).unwrap();
        assert_eq!(proposal.candidate_action, "CALL add|1|2");
        assert_eq!(proposal.confidence, 0.4);
        assert!(proposal.error_flag);
    }

    #[test]
    fn test_fallback_legacy_marker_in_prose() {
        let raw = "Sure! To get started I will do FUNCTION_CALL: add|5|3";
        let proposal = parser().parse(raw).unwrap();
        assert_eq!(proposal.candidate_action, "CALL add|5|3");
        assert_eq!(proposal.rationale, DEFAULT_RATIONALE);
    }

    #[test]
    fn test_fallback_leading_keyword() {
        let raw = "Here is my answer.\nANSWER 8";
        assert_eq!(parser().fallback_action(raw).as_deref(), Some("ANSWER 8"));
    }

    #[test]
    fn test_fallback_known_tool() {
        let raw = "I'll use add_list|[1,2,3] now.";
        assert_eq!(
            parser().fallback_action(raw).as_deref(),
            Some("CALL add_list|[1,2,3] now")
        );
        assert!(parser().parse_tagged(raw).is_none());
    }

    #[test]
    fn test_fallback_takes_earliest_line() {
        let raw = "So the result is FINAL_ANSWER: 8\nEarlier I ran FUNCTION_CALL: add|5|3";
        assert_eq!(parser().parse(raw).unwrap().candidate_action, "ANSWER 8");

        let raw = "Trying subtract|9|4 first\nCALL add|1|2";
        assert_eq!(
            parser().fallback_action(raw).as_deref(),
            Some("CALL subtract|9|4 first")
        );
    }

    #[test]
    fn test_fallback_respects_word_boundary() {
        let raw = "readd|1|2 is not a tool";
        assert!(parser().fallback_action(raw).is_none());
    }

    #[test]
    fn test_noise_is_parse_error() {
        let err = parser().parse("The weather is nice today.").unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }
}

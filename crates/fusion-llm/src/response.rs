//! Parsing free-form model output into an action.
//!
//! Models are asked to answer with labelled lines:
//!
//! ```text
//! ACTION: BUY
//! CONFIDENCE: 8/10
//! RATIONALE: ...
//! ```
//!
//! They do not always comply, so parsing falls back step by step. The first
//! `ACTION:` or `RECOMMENDATION:` line naming exactly one of `BUY`, `SELL`
//! or `HOLD` wins. Without labelled lines, the text must contain exactly one
//! distinct standalone upper-case action. An answer that names several
//! actions without settling on one, such as an echoed `BUY, SELL or HOLD`
//! template, is [`DataError::UnrecognizedModelOutput`] like any other.

use std::fmt;

use fusion_core::{DataError, Result};
use serde::{Deserialize, Serialize};

/// Confidence assumed when the model names an action but no confidence.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Longest rationale kept, in characters.
const MAX_RATIONALE_CHARS: usize = 600;

/// Recommended action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Increase the position.
    Buy,
    /// Reduce or close the position.
    Sell,
    /// Keep the position.
    Hold,
    /// The model answer could not be interpreted.
    NoAction,
}

impl Action {
    /// Upper-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::NoAction => "NO ACTION",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "HOLD" => Some(Self::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted model output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Recommended action; never [`Action::NoAction`].
    pub action: Action,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Model's explanation, trimmed.
    pub rationale: String,
}

/// Parses `text` into an action, confidence and rationale.
///
/// # Errors
///
/// Returns [`DataError::UnrecognizedModelOutput`] with the text length when
/// no action can be found.
pub fn parse_response(text: &str) -> Result<ParsedResponse> {
    let action = find_action(text).ok_or(DataError::UnrecognizedModelOutput(text.len()))?;

    let confidence = labelled(text, &["CONFIDENCE"])
        .and_then(parse_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Ok(ParsedResponse {
        action,
        confidence,
        rationale: rationale(text),
    })
}

/// The single action `text` settles on, if any.
fn find_action(text: &str) -> Option<Action> {
    let mut ambiguous_label = false;
    for value in text
        .lines()
        .filter_map(|line| label_value(line, &["ACTION", "RECOMMENDATION"]))
    {
        match mentioned(words(value).map(str::to_ascii_uppercase)).as_slice() {
            [action] => return Some(*action),
            [] => {}
            _ => ambiguous_label = true,
        }
    }
    if ambiguous_label {
        return None;
    }
    match mentioned(words(text)).as_slice() {
        [action] => Some(*action),
        _ => None,
    }
}

/// Distinct actions among `words`, in order of first mention.
fn mentioned<S: AsRef<str>>(words: impl Iterator<Item = S>) -> Vec<Action> {
    let mut found = Vec::new();
    for action in words.filter_map(|w| Action::from_word(w.as_ref())) {
        if !found.contains(&action) {
            found.push(action);
        }
    }
    found
}

/// Alphanumeric runs of `text`.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Splits a `LABEL: value` line, tolerating markdown decoration.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start_matches(|c: char| c.is_whitespace() || "#*->_".contains(c));
    let (label, value) = line.split_once(':')?;
    let label = label.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '_');
    let value = value.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '_');
    Some((label, value.trim_end()))
}

/// Value of `line` if it carries one of `labels` (case-insensitive).
fn label_value<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let (label, value) = split_label(line)?;
    labels
        .iter()
        .any(|l| label.eq_ignore_ascii_case(l))
        .then_some(value)
}

/// Value of the first line labelled with one of `labels`.
fn labelled<'a>(text: &'a str, labels: &[&str]) -> Option<&'a str> {
    text.lines().find_map(|line| label_value(line, labels))
}

/// Parses `8/10`, `75%`, `0.8`, `8` or `High` into `[0, 1]`.
fn parse_confidence(value: &str) -> Option<f64> {
    let value = value.trim().trim_end_matches(|c: char| c == '.' || c == '*' || c == ')');
    let lower = value.to_ascii_lowercase();
    match lower.split_whitespace().next()? {
        "high" => return Some(0.8),
        "medium" | "moderate" => return Some(0.6),
        "low" => return Some(0.3),
        _ => {}
    }

    let confidence = if let Some((num, den)) = value.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = leading_number(den)?;
        (den > 0.0).then(|| num / den)?
    } else if let Some(pct) = value.split_once('%').map(|(n, _)| n) {
        pct.trim().parse::<f64>().ok()? / 100.0
    } else {
        let token = value.split_whitespace().next()?;
        let x: f64 = token.parse().ok()?;
        if token.contains('.') && x <= 1.0 {
            x
        } else if (1.0..=10.0).contains(&x) {
            x / 10.0
        } else if x <= 100.0 {
            x / 100.0
        } else {
            return None;
        }
    };
    confidence.is_finite().then(|| confidence.clamp(0.0, 1.0))
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Text after a `RATIONALE:`/`REASONING:` label up to the next label, or
/// the whole answer when there is none.
fn rationale(text: &str) -> String {
    let mut lines = text.lines();
    let joined = match lines
        .by_ref()
        .find_map(|line| label_value(line, &["RATIONALE", "REASONING", "REASON"]))
    {
        Some(first) => std::iter::once(first)
            .chain(
                lines
                    .take_while(|line| {
                        label_value(line, &["ACTION", "RECOMMENDATION", "CONFIDENCE"]).is_none()
                    })
                    .map(str::trim),
            )
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => text.trim().to_string(),
    };

    match joined.char_indices().nth(MAX_RATIONALE_CHARS) {
        Some((cut, _)) => format!("{}...", &joined[..cut]),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_lines() {
        let parsed = parse_response(
            "ACTION: BUY\nCONFIDENCE: 8/10\nRATIONALE: Margins are strong.\nDebt is low.",
        )
        .unwrap();
        assert_eq!(parsed.action, Action::Buy);
        assert!((parsed.confidence - 0.8).abs() < 1e-9);
        assert_eq!(parsed.rationale, "Margins are strong. Debt is low.");
    }

    #[test]
    fn test_label_wins_over_earlier_token() {
        let text = "Analysts were split between SELL and HOLD.\n**Recommendation:** buy\nConfidence: 70%";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.action, Action::Buy);
        assert!((parsed.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_standalone_token_fallback() {
        let parsed = parse_response("After the BUYBACK news, I would HOLD for now.").unwrap();
        assert_eq!(parsed.action, Action::Hold);
        assert_eq!(parsed.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(parsed.rationale, "After the BUYBACK news, I would HOLD for now.");
    }

    #[test]
    fn test_several_actions_without_a_choice_are_unrecognized() {
        let split = "Analysts were split between SELL and HOLD.";
        assert_eq!(
            parse_response(split).unwrap_err(),
            DataError::UnrecognizedModelOutput(split.len())
        );

        let echoed = "ACTION: BUY, SELL or HOLD\nCONFIDENCE: a number from 1 to 10";
        assert!(matches!(
            parse_response(echoed),
            Err(DataError::UnrecognizedModelOutput(_))
        ));
    }

    #[test]
    fn test_answer_after_echoed_template() {
        let text = "ACTION: BUY, SELL or HOLD\nACTION: SELL\nCONFIDENCE: 4\nRATIONALE: Weak cash flow.";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.action, Action::Sell);
        assert!((parsed.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_action_is_still_one_choice() {
        let parsed = parse_response("HOLD. Nothing here justifies more than a HOLD.").unwrap();
        assert_eq!(parsed.action, Action::Hold);
    }

    #[test]
    fn test_lowercase_prose_is_not_an_action() {
        let err = parse_response("Investors who hold the stock may want to wait.").unwrap_err();
        assert_eq!(err, DataError::UnrecognizedModelOutput(46));
    }

    #[test]
    fn test_unrecognized_output() {
        let err = parse_response("I cannot help with that.").unwrap_err();
        assert_eq!(err, DataError::UnrecognizedModelOutput(24));
        assert!(parse_response("").is_err());
    }

    #[test]
    fn test_confidence_forms() {
        assert_eq!(parse_confidence("8/10"), Some(0.8));
        assert_eq!(parse_confidence("3 / 5 (moderate)"), Some(0.6));
        assert_eq!(parse_confidence("75%"), Some(0.75));
        assert_eq!(parse_confidence("0.65"), Some(0.65));
        assert_eq!(parse_confidence("7"), Some(0.7));
        assert_eq!(parse_confidence("1"), Some(0.1));
        assert_eq!(parse_confidence("85"), Some(0.85));
        assert_eq!(parse_confidence("High"), Some(0.8));
        assert_eq!(parse_confidence("12/10"), Some(1.0));
        assert_eq!(parse_confidence("unsure"), None);
        assert_eq!(parse_confidence("5/0"), None);
    }

    #[test]
    fn test_rationale_truncated() {
        let long = format!("ACTION: SELL\nRATIONALE: {}", "x".repeat(1000));
        let parsed = parse_response(&long).unwrap();
        assert_eq!(parsed.rationale.chars().count(), MAX_RATIONALE_CHARS + 3);
    }
}

//! Lowercasing tokenizer with English stop words and bigrams.

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Splits `text` into lowercase unigrams.
///
/// Tokens are runs of alphanumerics; a `.` between alphanumerics is kept so
/// exchange-qualified symbols such as `tcs.ns` stay whole. Stop words and
/// single-character tokens are dropped.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|raw| raw.trim_matches('.'))
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Unigrams of `text` followed by bigrams of adjacent unigrams.
#[must_use]
pub fn terms(text: &str) -> Vec<String> {
    let unigrams = tokenize(text);
    let bigrams: Vec<String> = unigrams
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect();
    let mut terms = unigrams;
    terms.extend(bigrams);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted() {
        assert!(STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tokenize_keeps_symbols() {
        assert_eq!(
            tokenize("The price of TCS.NS rose, and RSI is 71.5."),
            vec!["price", "tcs.ns", "rose", "rsi", "71.5"]
        );
    }

    #[test]
    fn test_trailing_dots_and_short_tokens() {
        assert_eq!(tokenize("Buy. A x y ok..."), vec!["buy", "ok"]);
    }

    #[test]
    fn test_bigrams_follow_unigrams() {
        assert_eq!(
            terms("strong revenue growth"),
            vec![
                "strong",
                "revenue",
                "growth",
                "strong revenue",
                "revenue growth"
            ]
        );
        assert!(terms("the of and").is_empty());
    }
}

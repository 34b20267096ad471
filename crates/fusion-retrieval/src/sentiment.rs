//! Lexicon polarity of news per symbol.
//!
//! Each article scores the mean weight of the polar words it contains, in
//! `[-1, 1]`. A polar word right after a negation counts at minus half its
//! weight. A symbol's score is the mean over its articles.

use std::fmt;

use fusion_core::{NewsItem, Symbol};
use serde::{Deserialize, Serialize};

/// Scores strictly above this are positive, strictly below its negation negative.
pub const LABEL_THRESHOLD: f64 = 0.1;

/// Polar words and their weights, sorted for binary search.
const LEXICON: &[(&str, f64)] = &[
    ("bad", -0.70), ("bearish", -0.80), ("beat", 0.50), ("beats", 0.50), ("boost", 0.50),
    ("bullish", 0.80), ("concern", -0.40), ("concerns", -0.40), ("crash", -0.80), ("cut", -0.30),
    ("cuts", -0.30), ("decline", -0.40), ("declines", -0.40), ("default", -0.70),
    ("downgrade", -0.60), ("downgraded", -0.60), ("drop", -0.40), ("drops", -0.40),
    ("excellent", 1.00), ("fall", -0.40), ("falls", -0.40), ("fraud", -1.00), ("gain", 0.40),
    ("gains", 0.40), ("good", 0.70), ("great", 0.80), ("growth", 0.40), ("higher", 0.25),
    ("improve", 0.50), ("improved", 0.50), ("improving", 0.50), ("lawsuit", -0.50),
    ("loss", -0.50), ("losses", -0.50), ("lower", -0.25), ("miss", -0.50), ("misses", -0.50),
    ("negative", -0.50), ("optimistic", 0.60), ("outperform", 0.60), ("penalty", -0.50),
    ("pessimistic", -0.60), ("plunge", -0.70), ("plunges", -0.70), ("poor", -0.60),
    ("positive", 0.50), ("profit", 0.40), ("profitable", 0.50), ("raised", 0.30), ("rally", 0.50),
    ("record", 0.40), ("recovery", 0.40), ("rise", 0.30), ("rises", 0.30), ("risk", -0.30),
    ("robust", 0.60), ("selloff", -0.60), ("slump", -0.60), ("soar", 0.70), ("soars", 0.70),
    ("strong", 0.60), ("surge", 0.60), ("surges", 0.60), ("upgrade", 0.60), ("upgraded", 0.60),
    ("weak", -0.50), ("weaker", -0.50), ("win", 0.50), ("wins", 0.50), ("worst", -1.00),
];

const NEGATIONS: &[&str] = &["never", "no", "not", "without"];

/// Overall tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    /// Above [`LABEL_THRESHOLD`].
    Positive,
    /// Within the threshold either way.
    Neutral,
    /// Below `-LABEL_THRESHOLD`.
    Negative,
}

impl SentimentLabel {
    /// Label of `score`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            Self::Positive
        } else if score < -LABEL_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polarity of `text` in `[-1, 1]`; zero when it has no polar words.
#[must_use]
pub fn polarity(text: &str) -> f64 {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut total = 0.0;
    let mut hits = 0_u32;
    for (i, word) in words.iter().enumerate() {
        let Ok(at) = LEXICON.binary_search_by_key(&word.as_str(), |&(w, _)| w) else {
            continue;
        };
        let weight = LEXICON[at].1;
        let negated = i > 0 && NEGATIONS.contains(&words[i - 1].as_str());
        total += if negated { -0.5 * weight } else { weight };
        hits += 1;
    }

    if hits == 0 {
        0.0
    } else {
        (total / f64::from(hits)).clamp(-1.0, 1.0)
    }
}

/// News tone of one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsSentiment {
    /// Symbol the articles are about.
    pub symbol: Symbol,
    /// Mean article polarity, rounded to three decimals.
    pub score: f64,
    /// Label of `score`.
    pub label: SentimentLabel,
    /// Articles analysed.
    pub article_count: usize,
    /// Articles above the positive threshold.
    pub positive: usize,
    /// Articles below the negative threshold.
    pub negative: usize,
    /// Articles within the threshold.
    pub neutral: usize,
}

impl NewsSentiment {
    /// Neutral sentiment with no articles.
    #[must_use]
    pub const fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            score: 0.0,
            label: SentimentLabel::Neutral,
            article_count: 0,
            positive: 0,
            negative: 0,
            neutral: 0,
        }
    }

    /// Scores the headline and body of every item in `items`.
    #[must_use]
    pub fn analyze<'a>(symbol: Symbol, items: impl IntoIterator<Item = &'a NewsItem>) -> Self {
        let mut sentiment = Self::empty(symbol);
        let mut total = 0.0;
        for item in items {
            let score = polarity(&format!("{} {}", item.headline, item.body));
            match SentimentLabel::from_score(score) {
                SentimentLabel::Positive => sentiment.positive += 1,
                SentimentLabel::Negative => sentiment.negative += 1,
                SentimentLabel::Neutral => sentiment.neutral += 1,
            }
            sentiment.article_count += 1;
            total += score;
        }

        if sentiment.article_count > 0 {
            // Counts stay far below 2^53.
            let mean = total / sentiment.article_count as f64;
            sentiment.score = (mean * 1000.0).round() / 1000.0;
            sentiment.label = SentimentLabel::from_score(sentiment.score);
        }
        sentiment
    }

    /// Returns true if no article was analysed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.article_count == 0
    }
}

impl fmt::Display for NewsSentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:+.3}) over {} articles: {} positive, {} negative, {} neutral",
            self.label, self.score, self.article_count, self.positive, self.negative, self.neutral
        )
    }
}

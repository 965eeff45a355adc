/// What a mention is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Question,
    PredictionTopic,
    Unclear,
}

/// Keyword and punctuation heuristics over mention text.
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    keywords: Vec<String>,
}

impl MessageClassifier {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// A `?` wins over keywords. Keyword matching is a case-insensitive
    /// substring test, so "chances" matches "chance".
    pub fn classify(&self, text: &str) -> Classification {
        if text.contains('?') {
            return Classification::Question;
        }
        let lowered = text.to_lowercase();
        if self
            .keywords
            .iter()
            .any(|k| !k.is_empty() && lowered.contains(k.as_str()))
        {
            return Classification::PredictionTopic;
        }
        Classification::Unclear
    }
}

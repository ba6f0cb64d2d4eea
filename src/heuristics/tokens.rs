use std::collections::HashMap;

use crate::models::Mention;

/// Shortest token counted as a mention
pub const MIN_TERM_CHARS: usize = 3;

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "him", "how", "its", "may", "new", "now", "old",
    "see", "way", "who", "did", "get", "got", "let", "say", "she", "too", "use", "with", "that",
    "this", "from", "they", "will", "would", "there", "their", "what", "about", "which", "when",
    "were", "been", "into", "than", "then", "them", "these", "those", "some", "such", "only",
    "very", "just", "also", "more", "most", "other", "over", "your", "yours", "because", "while",
    "where", "being", "does", "doing", "should", "could", "after", "before", "again", "each",
    "both", "same", "here", "customer", "seller", "call", "said", "says", "wants", "want",
];

const HINGLISH_STOPWORDS: &[&str] = &[
    "hai", "hain", "haan", "nahi", "nahin", "kya", "kyu", "kyun", "aap", "aapka", "aapki", "aapke",
    "hum", "hamara", "hamari", "mera", "meri", "mere", "tha", "thi", "the", "raha", "rahi", "rahe",
    "kar", "karo", "karna", "karke", "kiya", "kiye", "diya", "diye", "liya", "ho", "hoga", "hogi",
    "se", "ko", "ka", "ki", "ke", "me", "mein", "par", "pe", "aur", "bhi", "toh", "to", "jo",
    "koi", "kuch", "abhi", "sir", "madam", "ji", "accha", "acha", "theek", "thik", "bas", "wala",
    "wali", "wale", "yeh", "ye", "woh", "wo", "isme", "usme", "uske", "iske", "ek", "sab",
];

/// Lowercased words of `text`
///
/// Splits on whitespace, ASCII punctuation, Devanagari danda and curly quotes;
/// Devanagari letters are kept as-is.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| {
        c.is_whitespace()
            || c.is_ascii_punctuation()
            || matches!(c, '।' | '॥' | '“' | '”' | '‘' | '’')
    })
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
}

pub fn is_stopword(word: &str) -> bool {
    ENGLISH_STOPWORDS.contains(&word) || HINGLISH_STOPWORDS.contains(&word)
}

/// Tokens worth counting as mentions
pub fn content_terms(text: &str) -> impl Iterator<Item = String> + '_ {
    tokenize(text).filter(|w| {
        w.chars().count() >= MIN_TERM_CHARS
            && !w.chars().all(|c| c.is_ascii_digit())
            && !is_stopword(w)
    })
}

/// Most frequent content terms across `texts`
///
/// Ties keep the order in which terms were first seen.
pub fn top_terms<'a>(texts: impl IntoIterator<Item = &'a str>, n: usize) -> Vec<Mention> {
    // term -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0;
    for text in texts {
        for term in content_terms(text) {
            let entry = counts.entry(term).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(term, (count, _))| Mention { term, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_script() {
        let words: Vec<_> = tokenize("ग्राहक ने कहा: Leads galat city se aa rahi hain।").collect();
        assert_eq!(
            words,
            vec!["ग्राहक", "ने", "कहा", "leads", "galat", "city", "se", "aa", "rahi", "hain"]
        );
    }

    #[test]
    fn test_content_terms_filters_noise() {
        let terms: Vec<_> = content_terms("The leads are 100 percent galat hai, ok?").collect();
        assert_eq!(terms, vec!["leads", "percent", "galat"]);
    }

    #[test]
    fn test_top_terms_ties_by_first_occurrence() {
        let texts = ["refund delayed", "invoice missing refund", "invoice wrong"];
        let top = top_terms(texts, 3);
        let terms: Vec<_> = top.iter().map(|m| (m.term.as_str(), m.count)).collect();
        assert_eq!(terms, vec![("refund", 2), ("invoice", 2), ("delayed", 1)]);
    }

    #[test]
    fn test_top_terms_empty() {
        assert!(top_terms(std::iter::empty(), 5).is_empty());
        assert!(top_terms(["the and for"], 5).is_empty());
    }
}

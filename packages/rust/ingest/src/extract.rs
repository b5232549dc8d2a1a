//! Concept and signal extraction from HTML documents.
//!
//! The page is reduced to its main content region using readability
//! heuristics, flattened into ordered text blocks, and mined for candidate
//! concept labels: headings, emphasized terms, definition terms, and
//! multi-word capitalized phrases. Signals are derived from block order
//! (precedes) and block membership (co-occurs).

use std::collections::HashMap;
use std::sync::LazyLock;

use learnpath_shared::{IngestConfig, LearnPathError, Result, normalize_label};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::{ConceptMention, IngestedDocument, Signal};

/// Shortest accepted label, in characters.
const MIN_LABEL_CHARS: usize = 3;

/// Longest accepted label, in characters.
const MAX_LABEL_CHARS: usize = 60;

/// Labels with more words than this are sentences, not concepts.
const MAX_LABEL_WORDS: usize = 6;

/// Tags whose text is treated as one block.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "dt", "dd", "td", "blockquote",
];

/// Tags that never contribute content.
const CHROME_TAGS: &[&str] = &[
    "nav", "footer", "aside", "script", "style", "noscript", "template", "form",
];

/// Words that are never a concept on their own.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "how", "if", "in",
    "into", "is", "it", "its", "not", "of", "on", "or", "so", "that", "the", "their", "then",
    "there", "these", "this", "those", "to", "was", "we", "what", "when", "where", "which",
    "while", "who", "why", "will", "with", "you", "your",
];

/// Section headings that describe page structure rather than a topic.
const GENERIC_HEADINGS: &[&str] = &[
    "contents",
    "table of contents",
    "overview",
    "summary",
    "references",
    "see also",
    "further reading",
    "next steps",
    "navigation",
    "menu",
    "search",
    "footnotes",
    "notes",
    "exercises",
    "external links",
];

static CAPITALIZED_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][A-Za-z0-9+#'-]*(?:\s+[A-Z][A-Za-z0-9+#'-]*)+").expect("valid regex")
});

static LEADING_NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:chapter|section|step|part|lesson|unit)\s+)?\d+(?:\.\d+)*[.:)]?\s+")
        .expect("valid regex")
});

/// Options for [`extract_document`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Cap on co-occurrence pairs emitted per text block.
    pub max_pairs_per_block: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_pairs_per_block: 45,
        }
    }
}

impl From<&IngestConfig> for ExtractOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_pairs_per_block: config.max_pairs_per_block,
        }
    }
}

/// One unit of readable text in document order.
#[derive(Debug, Clone)]
struct TextBlock {
    /// Collapsed text content.
    text: String,
    /// Candidate labels found in this block, ordered by position.
    candidates: Vec<String>,
    words: usize,
}

/// Extract concepts and signals from a fetched HTML body.
///
/// Fails with a parse error when the page has no readable text or yields
/// no concepts; the caller records that as a skipped URL.
#[instrument(skip(body, opts), fields(url = %url, bytes = body.len()))]
pub fn extract_document(url: &str, body: &str, opts: &ExtractOptions) -> Result<IngestedDocument> {
    let doc = Html::parse_document(body);
    let blocks = content_blocks(&doc);

    let word_count: usize = blocks.iter().map(|b| b.words).sum();
    if word_count == 0 {
        return Err(LearnPathError::parse(format!("{url}: no readable text")));
    }

    // First pass: distinct candidates in encounter order.
    let mut labels: Vec<String> = Vec::new();
    let mut keys: HashMap<String, usize> = HashMap::new();
    for block in &blocks {
        for candidate in &block.candidates {
            let key = normalize_label(candidate);
            if !keys.contains_key(&key) {
                keys.insert(key, labels.len());
                labels.push(candidate.clone());
            }
        }
    }

    if labels.is_empty() {
        return Err(LearnPathError::parse(format!("{url}: no concepts found")));
    }

    // Second pass: which concepts each block mentions, by candidate or by
    // whole-word occurrence of the label in the block text.
    let match_keys: Vec<String> = labels.iter().map(|l| match_key(l)).collect();
    let mut first_block = vec![usize::MAX; labels.len()];
    let mut context_words = vec![0usize; labels.len()];
    let mut block_mentions: Vec<Vec<usize>> = Vec::with_capacity(blocks.len());

    for (block_idx, block) in blocks.iter().enumerate() {
        let haystack = format!(" {} ", match_key(&block.text));
        let mut mentioned: Vec<usize> = block
            .candidates
            .iter()
            .filter_map(|c| keys.get(&normalize_label(c)).copied())
            .collect();
        for (idx, key) in match_keys.iter().enumerate() {
            if !key.is_empty() && haystack.contains(&format!(" {key} ")) {
                mentioned.push(idx);
            }
        }
        mentioned.sort_unstable();
        mentioned.dedup();

        for &idx in &mentioned {
            first_block[idx] = first_block[idx].min(block_idx);
            context_words[idx] += block.words;
        }
        block_mentions.push(mentioned);
    }

    // Order of first appearance; encounter order breaks ties within a block.
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by_key(|&idx| (first_block[idx], idx));

    let concepts: Vec<ConceptMention> = order
        .iter()
        .map(|&idx| ConceptMention {
            label: labels[idx].clone(),
            context_words: context_words[idx],
        })
        .collect();

    let mut signals: Vec<Signal> = order
        .windows(2)
        .map(|pair| Signal::Precedes {
            before: labels[pair[0]].clone(),
            after: labels[pair[1]].clone(),
        })
        .collect();

    let rank: HashMap<usize, usize> = order.iter().enumerate().map(|(r, &i)| (i, r)).collect();
    for mentioned in &block_mentions {
        let mut ranked: Vec<usize> = mentioned.clone();
        ranked.sort_by_key(|idx| rank[idx]);
        let mut emitted = 0;
        'pairs: for (i, &a) in ranked.iter().enumerate() {
            for &b in &ranked[i + 1..] {
                if emitted >= opts.max_pairs_per_block {
                    break 'pairs;
                }
                signals.push(Signal::CoOccurs {
                    a: labels[a].clone(),
                    b: labels[b].clone(),
                });
                emitted += 1;
            }
        }
    }

    debug!(
        blocks = blocks.len(),
        concepts = concepts.len(),
        signals = signals.len(),
        "document extracted"
    );

    Ok(IngestedDocument {
        url: url.to_string(),
        content_hash: compute_hash(body),
        word_count,
        concepts,
        signals,
    })
}

// ---------------------------------------------------------------------------
// Block extraction
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Pick the main content element: `<main>`, `<article>`, `[role=main]`,
/// `.content`, then `<body>`.
fn content_root(doc: &Html) -> Option<(ElementRef<'_>, bool)> {
    for css in ["main", "article", r#"[role="main"]"#, ".content"] {
        if let Some(el) = doc.select(&selector(css)).next() {
            return Some((el, false));
        }
    }
    doc.select(&selector("body")).next().map(|el| (el, true))
}

/// Flatten the content region into ordered text blocks.
fn content_blocks(doc: &Html) -> Vec<TextBlock> {
    let Some((root, root_is_body)) = content_root(doc) else {
        return Vec::new();
    };

    let block_sel = selector(&BLOCK_TAGS.join(", "));
    let emphasis_sel = selector("strong, b, em, code, dfn");
    let mut blocks = Vec::new();

    for el in root.select(&block_sel) {
        if is_nested_or_chrome(el, root, root_is_body) {
            continue;
        }

        let text = collapse(&el.text().collect::<String>());
        if text.is_empty() {
            continue;
        }

        let tag = el.value().name();
        let mut candidates: Vec<String> = Vec::new();
        if tag.starts_with('h') || tag == "dt" {
            candidates.extend(clean_label(&text));
        } else {
            candidates.extend(
                el.select(&emphasis_sel)
                    .filter_map(|em| clean_label(&collapse(&em.text().collect::<String>()))),
            );
            candidates.extend(capitalized_phrases(&text));
            candidates.sort_by_key(|c| text.find(c.as_str()).unwrap_or(usize::MAX));
        }

        let words = text.split_whitespace().count();
        blocks.push(TextBlock {
            text,
            candidates,
            words,
        });
    }

    blocks
}

/// True if an ancestor below `root` is another block (the outer block owns
/// the text) or a chrome element.
fn is_nested_or_chrome(el: ElementRef<'_>, root: ElementRef<'_>, root_is_body: bool) -> bool {
    for ancestor in el.ancestors() {
        if ancestor.id() == root.id() {
            break;
        }
        let Some(element) = ancestor.value().as_element() else {
            continue;
        };
        let name = element.name();
        if BLOCK_TAGS.contains(&name) || CHROME_TAGS.contains(&name) {
            return true;
        }
        if root_is_body && name == "header" {
            return true;
        }
    }
    false
}

/// Multi-word capitalized runs like "Binary Search Tree", minus leading
/// stop words such as "The".
fn capitalized_phrases(text: &str) -> Vec<String> {
    CAPITALIZED_PHRASE
        .find_iter(text)
        .filter_map(|m| {
            let words: Vec<&str> = m
                .as_str()
                .split_whitespace()
                .skip_while(|w| STOP_WORDS.contains(&w.to_lowercase().as_str()))
                .collect();
            if words.len() < 2 {
                return None;
            }
            clean_label(&words.join(" "))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Label cleanup
// ---------------------------------------------------------------------------

/// Turn raw text into an acceptable concept label, or reject it.
pub(crate) fn clean_label(raw: &str) -> Option<String> {
    let collapsed = collapse(raw);
    let unnumbered = LEADING_NUMBERING.replace(&collapsed, "");

    let trimmed = unnumbered
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(|c: char| {
            matches!(
                c,
                '.' | ',' | ':' | ';' | '!' | '?' | '¶' | '§' | '"' | '\'' | '“' | '”' | '‘'
                    | '’' | '(' | '[' | '{' | '|' | '-' | '–' | '—'
            ) || c.is_whitespace()
        });
    let label = if trimmed.ends_with(')') && !trimmed.contains('(') {
        trimmed.trim_end_matches(')').trim_end()
    } else {
        trimmed
    };

    let chars = label.chars().count();
    if !(MIN_LABEL_CHARS..=MAX_LABEL_CHARS).contains(&chars) {
        return None;
    }
    if label.split_whitespace().count() > MAX_LABEL_WORDS {
        return None;
    }
    if !label.chars().any(char::is_alphabetic) {
        return None;
    }

    let key = normalize_label(label);
    if STOP_WORDS.contains(&key.as_str()) || GENERIC_HEADINGS.contains(&key.as_str()) {
        return None;
    }

    Some(label.to_string())
}

/// Collapse whitespace runs and trim.
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric words joined by single spaces, for whole-word matching.
fn match_key(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON: &str = r#"<html><body>
        <nav><ul><li>Site Map</li></ul></nav>
        <main>
            <h1>Python Basics</h1>
            <p>Before writing programs you need <strong>Variables</strong> and <em>Data Types</em>.</p>
            <h2>Control Flow</h2>
            <p>Use <code>for</code> loops once you understand variables.</p>
            <ul><li><p>Nested paragraph about <b>Functions</b></p></li></ul>
        </main>
        <footer><p>Copyright Example Corp</p></footer>
    </body></html>"#;

    fn labels(doc: &IngestedDocument) -> Vec<&str> {
        doc.concepts.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn extracts_concepts_in_first_appearance_order() {
        let doc = extract_document("https://docs.example.com/py", LESSON, &ExtractOptions::default())
            .expect("extract");

        assert_eq!(
            labels(&doc),
            vec!["Python Basics", "Variables", "Data Types", "Control Flow", "Functions"]
        );
        assert_eq!(doc.content_hash.len(), 64);
    }

    #[test]
    fn consecutive_concepts_emit_precedes() {
        let doc = extract_document("https://docs.example.com/py", LESSON, &ExtractOptions::default())
            .expect("extract");

        assert!(doc.signals.contains(&Signal::Precedes {
            before: "Python Basics".into(),
            after: "Variables".into(),
        }));
        assert!(doc.signals.contains(&Signal::Precedes {
            before: "Control Flow".into(),
            after: "Functions".into(),
        }));
    }

    #[test]
    fn same_block_concepts_co_occur() {
        let doc = extract_document("https://docs.example.com/py", LESSON, &ExtractOptions::default())
            .expect("extract");

        assert!(doc.signals.contains(&Signal::CoOccurs {
            a: "Variables".into(),
            b: "Data Types".into(),
        }));
        assert!(!doc.signals.iter().any(|s| matches!(
            s,
            Signal::CoOccurs { a, b } if a == "Python Basics" || b == "Python Basics"
        )));
    }

    #[test]
    fn plain_mentions_count_as_context() {
        let doc = extract_document("https://docs.example.com/py", LESSON, &ExtractOptions::default())
            .expect("extract");
        let variables = doc
            .concepts
            .iter()
            .find(|c| c.label == "Variables")
            .expect("variables concept");
        // 9 words in the defining paragraph + 7 in the later mention.
        assert_eq!(variables.context_words, 16);
    }

    #[test]
    fn chrome_is_ignored_when_falling_back_to_body() {
        let html = r#"<html><body>
            <header><h1>Site Header Title</h1></header>
            <nav><ul><li><strong>Home Page</strong></li></ul></nav>
            <h2>Graph Theory</h2>
            <p>A graph has <strong>Vertices</strong> and edges.</p>
            <aside><p><strong>Sponsored Content</strong></p></aside>
        </body></html>"#;
        let doc = extract_document("https://docs.example.com/g", html, &ExtractOptions::default())
            .expect("extract");

        assert_eq!(labels(&doc), vec!["Graph Theory", "Vertices"]);
    }

    #[test]
    fn co_occurrence_pairs_are_capped() {
        let html = r#"<html><body><main><p>
            <b>Alpha Topic</b> <b>Beta Topic</b> <b>Gamma Topic</b> <b>Delta Topic</b>
        </p></main></body></html>"#;
        let opts = ExtractOptions {
            max_pairs_per_block: 2,
        };
        let doc = extract_document("https://docs.example.com/c", html, &opts).expect("extract");
        let pairs = doc
            .signals
            .iter()
            .filter(|s| matches!(s, Signal::CoOccurs { .. }))
            .count();
        assert_eq!(pairs, 2);
    }

    #[test]
    fn empty_page_is_an_error() {
        let err = extract_document(
            "https://docs.example.com/empty",
            "<html><body></body></html>",
            &ExtractOptions::default(),
        )
        .expect_err("no text");
        assert!(err.to_string().contains("no readable text"));

        let err = extract_document(
            "https://docs.example.com/plain",
            "<html><body><p>just some lowercase words here</p></body></html>",
            &ExtractOptions::default(),
        )
        .expect_err("no concepts");
        assert!(err.to_string().contains("no concepts found"));
    }

    #[test]
    fn clean_label_rules() {
        assert_eq!(clean_label("  1.2  Binary   Search: "), Some("Binary Search".into()));
        assert_eq!(clean_label("Chapter 3: Recursion"), Some("Recursion".into()));
        assert_eq!(clean_label("Lists (Python)"), Some("Lists (Python)".into()));
        assert_eq!(clean_label("C++"), Some("C++".into()));
        assert_eq!(clean_label("the"), None);
        assert_eq!(clean_label("Overview"), None);
        assert_eq!(clean_label("42"), None);
        assert_eq!(clean_label("ab"), None);
        assert_eq!(
            clean_label("this sentence is far too long to be a concept label"),
            None
        );
    }

    #[test]
    fn capitalized_phrases_drop_leading_stop_words() {
        let phrases = capitalized_phrases("The Binary Search Tree keeps keys sorted.");
        assert_eq!(phrases, vec!["Binary Search Tree".to_string()]);
        assert!(capitalized_phrases("Nothing here matters").is_empty());
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}

/// Maximum term length to store in the index.
/// Longer runs are almost always hashes or encoded blobs nobody searches for.
const MAX_TERM_LENGTH: usize = 128;

/// Split a field value into searchable terms.
///
/// Terms are maximal runs of alphanumeric characters, lowercased. Order and
/// duplicates are kept so phrase verification can walk the sequence.
pub fn analyze(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            push_term(&mut terms, &mut current);
        }
    }

    if !current.is_empty() {
        push_term(&mut terms, &mut current);
    }

    terms
}

fn push_term(terms: &mut Vec<String>, current: &mut String) {
    if current.len() <= MAX_TERM_LENGTH {
        terms.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Check whether `needle` occurs as a contiguous run inside `haystack`
pub fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

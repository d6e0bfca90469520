//! Sentence-boundary text chunker.
//!
//! Splits extracted document text into pieces of at most `max_chars`
//! characters. Sentences end at `.`, `!` or `?` followed by whitespace and
//! are packed greedily into chunks joined by single spaces. A sentence that
//! alone exceeds the limit is split on whitespace into word groups; a single
//! word longer than the limit becomes its own (oversized) chunk.
//!
//! Joining the output with `" "` reproduces the sentence/word sequence of the
//! input with inter-unit whitespace collapsed to one space.

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Returns an empty vector for empty or whitespace-only input.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();

        if len > max_chars {
            // Flush first so chunk order follows sentence order
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(split_words(sentence, max_chars));
            continue;
        }

        let would_be = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };

        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split text into sentences after terminal punctuation followed by whitespace.
///
/// The punctuation stays with its sentence; the whitespace run after it is
/// dropped. Leading and trailing whitespace of `text` is ignored.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut sentences = Vec::new();
    if text.is_empty() {
        return sentences;
    }

    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars.peek().is_some_and(|&(_, next)| next.is_whitespace());
        if !followed_by_space {
            continue;
        }

        sentences.push(&text[start..i + c.len_utf8()]);

        // `text` is trimmed, so a non-whitespace char always follows the run
        while let Some(&(j, w)) = chars.peek() {
            if w.is_whitespace() {
                chars.next();
            } else {
                start = j;
                break;
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Group the words of an oversized sentence into pieces of at most `max_chars`.
fn split_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in sentence.split_whitespace() {
        let len = word.chars().count();
        if !current.is_empty() && current_len + 1 + len > max_chars {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += len;
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

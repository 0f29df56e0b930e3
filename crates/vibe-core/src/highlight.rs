//! Picks the words of a verdict worth emphasizing.

const KEY_TERMS: [&str; 14] = [
    "symmetry", "radiance", "divine", "iconic", "flawless", "aesthetic", "golden",
    "ratio", "structure", "luminance", "harmony", "celestial", "legendary", "magnetic",
];

/// Words longer than this (alphanumerics only) are worth a highlight.
const LONG_WORD_CHARS: usize = 7;
const MAX_HIGHLIGHTS: usize = 2;

fn score(word: &str) -> u8 {
    let clean: String = word.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if KEY_TERMS.contains(&clean.to_ascii_lowercase().as_str()) {
        2
    } else if clean.chars().count() > LONG_WORD_CHARS {
        1
    } else {
        0
    }
}

/// Indices (into `text.split(' ')`) of at most two highlighted words, in
/// ascending order. Key terms beat long words; ties go to the earlier word.
pub fn highlighted_indices(text: &str) -> Vec<usize> {
    let mut scored: Vec<(usize, u8)> = text
        .split(' ')
        .enumerate()
        .map(|(i, w)| (i, score(w)))
        .filter(|(_, s)| *s > 0)
        .collect();
    // Stable sort keeps word order within a score.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let mut picked: Vec<usize> = scored.into_iter().take(MAX_HIGHLIGHTS).map(|(i, _)| i).collect();
    picked.sort_unstable();
    picked
}

/// Render `text` with highlighted words passed through `mark`.
pub fn render_highlighted<F: Fn(&str) -> String>(text: &str, mark: F) -> String {
    let picked = highlighted_indices(text);
    text.split(' ')
        .enumerate()
        .map(|(i, w)| if picked.contains(&i) { mark(w) } else { w.to_string() })
        .collect::<Vec<_>>()
        .join(" ")
}

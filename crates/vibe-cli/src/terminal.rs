//! Terminal rendering for a session: progress bar, rarity stamp and the
//! typewriter verdict.

use vibe_core::highlight::highlighted_indices;
use vibe_core::RarityTier;

const BAR_WIDTH: usize = 30;
const BOLD_YELLOW: &str = "\x1b[1;33m";
const RESET: &str = "\x1b[0m";

pub fn progress_bar(pct: f32) -> String {
    let pct = pct.clamp(0.0, 100.0);
    let filled = ((pct / 100.0) * BAR_WIDTH as f32).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        pct.floor() as u32
    )
}

pub fn stamp(tier: &RarityTier) -> String {
    format!("*** {} ***  ({})", tier.label.to_uppercase(), tier.color)
}

pub fn ansi_mark(word: &str) -> String {
    format!("{BOLD_YELLOW}{word}{RESET}")
}

/// Emits a description a few characters at a time, marking highlighted words
/// as they appear.
pub struct Typewriter<F> {
    chars: Vec<(char, bool)>,
    printed: usize,
    mark: F,
}

impl<F: Fn(&str) -> String> Typewriter<F> {
    pub fn new(text: &str, mark: F) -> Self {
        let picked = highlighted_indices(text);
        let mut word = 0;
        let chars = text
            .chars()
            .map(|c| {
                if c == ' ' {
                    word += 1;
                    (c, false)
                } else {
                    (c, picked.contains(&word))
                }
            })
            .collect();
        Self {
            chars,
            printed: 0,
            mark,
        }
    }

    /// Rendered text for characters `[printed, shown)`.
    pub fn advance(&mut self, shown: usize) -> String {
        let end = shown.min(self.chars.len());
        let mut out = String::new();
        let mut run = String::new();
        let mut run_marked = false;

        for &(c, marked) in self.chars.get(self.printed..end).unwrap_or_default() {
            if marked != run_marked && !run.is_empty() {
                out.push_str(&self.flush(&run, run_marked));
                run.clear();
            }
            run_marked = marked;
            run.push(c);
        }
        if !run.is_empty() {
            out.push_str(&self.flush(&run, run_marked));
        }
        self.printed = self.printed.max(end);
        out
    }

    fn flush(&self, run: &str, marked: bool) -> String {
        if marked {
            (self.mark)(run)
        } else {
            run.to_string()
        }
    }
}

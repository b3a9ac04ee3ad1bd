//! Attempt History Views
//!
//! Read-only renderings of the attempt log that feed repair prompts: a
//! one-line-per-attempt summary and a bounded transcript of the most recent
//! attempts. Numbering always reflects the position in the full log, so a
//! tail view starts at `len - shown + 1` rather than at 1.

use crate::attempt::Attempt;

/// Placeholder used when there is no history yet.
pub const NO_ATTEMPTS: &str = "(none)";

const SUMMARY_ERROR_CHARS: usize = 140;
const TRANSCRIPT_SEPARATOR: &str = "\n\n---\n\n";

/// Bounds for [`transcript`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptLimits {
    pub max_items: usize,
    pub max_sql_chars: usize,
    pub max_err_chars: usize,
    pub max_notes_chars: usize,
}

impl Default for TranscriptLimits {
    fn default() -> Self {
        Self {
            max_items: 5,
            max_sql_chars: 1400,
            max_err_chars: 800,
            max_notes_chars: 600,
        }
    }
}

/// Default number of lines in [`summary`].
pub const DEFAULT_SUMMARY_ITEMS: usize = 10;

/// Tail of `attempts` paired with their 1-based position in the full list.
fn numbered_tail(attempts: &[Attempt], max_items: usize) -> impl Iterator<Item = (usize, &Attempt)> {
    let skip = attempts.len().saturating_sub(max_items);
    attempts.iter().enumerate().skip(skip).map(|(i, a)| (i + 1, a))
}

fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Short summary: one line per attempt with the error cut to 140 characters.
pub fn summary(attempts: &[Attempt], max_items: usize) -> String {
    if attempts.is_empty() || max_items == 0 {
        return NO_ATTEMPTS.to_string();
    }

    numbered_tail(attempts, max_items)
        .map(|(i, a)| {
            let flat = a.error().replace('\n', " ");
            let err = flat.trim();
            let shown = take_chars(err, SUMMARY_ERROR_CHARS);
            let ellipsis = if shown.len() < err.len() { "…" } else { "" };
            format!("- #{}: {} | {}{}", i, a.error_type(), shown, ellipsis)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact transcript of the last `limits.max_items` attempts.
pub fn transcript(attempts: &[Attempt], limits: TranscriptLimits) -> String {
    if attempts.is_empty() || limits.max_items == 0 {
        return NO_ATTEMPTS.to_string();
    }

    numbered_tail(attempts, limits.max_items)
        .map(|(i, a)| {
            let mut block = format!(
                "ATTEMPT #{}\nERROR_TYPE: {}\nSQL:\n{}\n\nERROR:\n{}\n",
                i,
                a.error_type(),
                take_chars(a.sql(), limits.max_sql_chars),
                take_chars(a.error(), limits.max_err_chars),
            );
            if let Some(notes) = a.fix_notes().filter(|n| !n.is_empty()) {
                block.push_str(&format!(
                    "\nFIX_NOTES:\n{}\n",
                    take_chars(notes, limits.max_notes_chars)
                ));
            }
            block
        })
        .collect::<Vec<_>>()
        .join(TRANSCRIPT_SEPARATOR)
}

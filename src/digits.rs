//! Six-digit candidate extraction.
//!
//! Two passes run over every recognition and their results are unioned:
//!
//! - **word pass**: trusts the engine's word boundaries and slides a window
//!   over the digits of each line;
//! - **gap pass**: rebuilds per-digit tokens and re-derives runs from pixel
//!   gaps, recovering numbers the engine split apart or glued to neighbours.

use crate::config::ExtractionConfig;
use crate::lines::{group_into_lines, sort_by_x, Line};
use crate::ocr::{BoundingBox, Recognition, Token};
use crate::ticket::{Candidate, TICKET_DIGITS};

/// Candidates from both passes over one recognition.
pub fn extract_candidates(rec: &Recognition, config: &ExtractionConfig) -> Vec<Candidate> {
    let word_lines = group_into_lines(&rec.words, config.line_threshold_px);
    let mut out = word_pass(&word_lines);
    out.extend(gap_pass(rec, config));
    out
}

// ── Word pass ────────────────────────────────────────────────────────────────

/// Sliding 6-digit windows over the concatenated digits of each line.
///
/// Box and confidence come from every word the window touches, first to last.
pub fn word_pass(lines: &[Line]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for line in lines {
        // (digit, index of the word it came from)
        let chars: Vec<(char, usize)> = line
            .iter()
            .enumerate()
            .flat_map(|(idx, word)| word.digits().chars().map(move |c| (c, idx)).collect::<Vec<_>>())
            .collect();
        if chars.len() < TICKET_DIGITS {
            continue;
        }

        for window in chars.windows(TICKET_DIGITS) {
            let number: String = window.iter().map(|(c, _)| *c).collect();
            let first = window[0].1;
            let last = window[TICKET_DIGITS - 1].1;
            if let Some(c) = window_candidate(number, &line[first..=last]) {
                out.push(c);
            }
        }
    }
    out
}

// ── Gap pass ─────────────────────────────────────────────────────────────────

/// Re-cluster single-digit tokens by horizontal gaps.
pub fn gap_pass(rec: &Recognition, config: &ExtractionConfig) -> Vec<Candidate> {
    let tokens = digit_tokens(rec);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for mut line in group_into_lines(&tokens, config.line_threshold_px) {
        if line.len() < TICKET_DIGITS {
            continue;
        }
        sort_by_x(&mut line);

        let gaps: Vec<f64> = line
            .windows(2)
            .map(|pair| gap(&pair[0], &pair[1]))
            .filter(|g| g.is_finite())
            .collect();
        let threshold = gap_threshold(median(&gaps), config);

        for run in split_runs(&line, threshold) {
            for window in run.windows(TICKET_DIGITS) {
                let number: String = window.iter().map(|t| t.text.as_str()).collect();
                if let Some(c) = window_candidate(number, window) {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// One token per digit.
///
/// Character-level symbols are used when the engine reported any; otherwise
/// each word's box is cut into equal-width slices, one per digit, each
/// keeping the word's confidence.
pub fn digit_tokens(rec: &Recognition) -> Vec<Token> {
    if !rec.symbols.is_empty() {
        return rec
            .symbols
            .iter()
            .filter(|s| s.text.len() == 1 && s.text.bytes().all(|b| b.is_ascii_digit()))
            .cloned()
            .collect();
    }

    let mut tokens = Vec::new();
    for word in &rec.words {
        let digits = word.digits();
        if digits.is_empty() {
            continue;
        }
        let b = word.bbox;
        let slice = b.width().max(1.0) / digits.len() as f64;
        for (i, ch) in digits.chars().enumerate() {
            let x0 = b.x0 + i as f64 * slice;
            tokens.push(Token::new(
                ch.to_string(),
                BoundingBox::new(x0, b.y0, x0 + slice, b.y1),
                word.confidence,
            ));
        }
    }
    tokens
}

/// Join threshold for a line: `median × multiplier + bias`.
///
/// A zero median (touching glyphs) is replaced by the configured fallback.
pub fn gap_threshold(median_gap: f64, config: &ExtractionConfig) -> f64 {
    let base = if median_gap == 0.0 || !median_gap.is_finite() {
        config.fallback_median_gap_px
    } else {
        median_gap
    };
    base * config.gap_multiplier + config.gap_bias_px
}

/// Split x-sorted tokens into runs whose consecutive gaps are all within
/// `threshold`. Runs shorter than a ticket number are dropped.
fn split_runs(line: &[Token], threshold: f64) -> Vec<&[Token]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..line.len() {
        if gap(&line[i - 1], &line[i]) > threshold {
            runs.push(&line[start..i]);
            start = i;
        }
    }
    runs.push(&line[start..]);
    runs.retain(|r| r.len() >= TICKET_DIGITS);
    runs
}

fn gap(prev: &Token, cur: &Token) -> f64 {
    cur.bbox.x0 - prev.bbox.x1
}

/// Median of `values`; 0 when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

fn window_candidate(number: String, tokens: &[Token]) -> Option<Candidate> {
    let bbox = BoundingBox::union_all(tokens.iter().map(|t| &t.bbox))?;
    let confidence = tokens.iter().map(|t| t.confidence).sum::<f64>() / tokens.len().max(1) as f64;
    Candidate::new(number, confidence, Some(bbox.into()))
}

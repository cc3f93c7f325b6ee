//! Greedy row clustering over tokens sorted by vertical midpoint.
//!
//! Assumes roughly horizontal rows; skewed text is handled by the rotated
//! variants, not here.

use crate::ocr::Token;

/// Tokens sharing a vertical band, sorted by `x0`.
pub type Line = Vec<Token>;

/// Group tokens into lines.
///
/// A token joins the open line when its midpoint is within `threshold_px` of
/// the line's running mean midpoint; otherwise it starts a new line.
pub fn group_into_lines(tokens: &[Token], threshold_px: f64) -> Vec<Line> {
    let mut sorted: Vec<&Token> = tokens.iter().collect();
    sorted.sort_by(|a, b| a.bbox.mid_y().total_cmp(&b.bbox.mid_y()));

    let mut lines: Vec<Line> = Vec::new();
    // running sum of midpoints of the open line
    let mut mid_sum = 0.0;

    for token in sorted {
        let mid = token.bbox.mid_y();
        let joins = lines
            .last()
            .is_some_and(|line| (mid - mid_sum / line.len() as f64).abs() <= threshold_px);
        if joins {
            if let Some(line) = lines.last_mut() {
                line.push(token.clone());
            }
            mid_sum += mid;
        } else {
            lines.push(vec![token.clone()]);
            mid_sum = mid;
        }
    }

    for line in &mut lines {
        sort_by_x(line);
    }
    lines
}

/// Stable sort by left edge.
pub fn sort_by_x(tokens: &mut [Token]) {
    tokens.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::BoundingBox;

    fn tok(text: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Token {
        Token::new(text, BoundingBox::new(x0, y0, x1, y1), 90.0)
    }

    fn texts(line: &Line) -> Vec<&str> {
        line.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn splits_rows_and_sorts_by_x() {
        let tokens = vec![
            tok("b", 200.0, 102.0, 260.0, 140.0),
            tok("x", 10.0, 300.0, 40.0, 330.0),
            tok("a", 50.0, 100.0, 110.0, 138.0),
        ];
        let lines = group_into_lines(&tokens, 12.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0]), vec!["a", "b"]);
        assert_eq!(texts(&lines[1]), vec!["x"]);
    }

    #[test]
    fn threshold_is_inclusive() {
        // midpoints 100 and 112: exactly 12 apart
        let tokens = vec![tok("a", 0.0, 90.0, 10.0, 110.0), tok("b", 20.0, 102.0, 30.0, 122.0)];
        assert_eq!(group_into_lines(&tokens, 12.0).len(), 1);
        assert_eq!(group_into_lines(&tokens, 11.9).len(), 2);
    }

    #[test]
    fn compares_against_running_mean() {
        // midpoints 100, 110, 120: 120 is 15 from the mean of the first two
        let tokens = vec![
            tok("a", 0.0, 90.0, 10.0, 110.0),
            tok("b", 20.0, 100.0, 30.0, 120.0),
            tok("c", 40.0, 110.0, 50.0, 130.0),
        ];
        let lines = group_into_lines(&tokens, 12.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0]), vec!["a", "b"]);
        assert_eq!(texts(&lines[1]), vec!["c"]);
    }

    #[test]
    fn empty_input() {
        assert!(group_into_lines(&[], 12.0).is_empty());
    }
}

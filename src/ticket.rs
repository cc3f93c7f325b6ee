use serde::{Deserialize, Serialize};

use crate::ocr::BoundingBox;

/// Every ticket number has exactly this many digits.
pub const TICKET_DIGITS: usize = 6;

/// `true` for strings matching `^[0-9]{6}$`.
pub fn is_ticket_number(s: &str) -> bool {
    s.len() == TICKET_DIGITS && s.bytes().all(|b| b.is_ascii_digit())
}

/// Box in `{x, y, w, h}` form, as consumers of the scan result expect it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TicketBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<BoundingBox> for TicketBox {
    fn from(b: BoundingBox) -> Self {
        TicketBox {
            x: b.x0,
            y: b.y0,
            w: b.width(),
            h: b.height(),
        }
    }
}

/// A hypothesised ticket number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub number: String,
    /// 0.0 – 100.0
    pub confidence: f64,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<TicketBox>,
}

impl Candidate {
    /// `None` unless `number` is six ASCII digits. Confidence is clamped into
    /// 0–100 (non-finite → 0).
    pub fn new(number: impl Into<String>, confidence: f64, bbox: Option<TicketBox>) -> Option<Self> {
        let number = number.into();
        if !is_ticket_number(&number) {
            return None;
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Some(Candidate {
            number,
            confidence,
            bbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_number_shape() {
        assert!(is_ticket_number("000123"));
        assert!(!is_ticket_number("12345"));
        assert!(!is_ticket_number("1234567"));
        assert!(!is_ticket_number("12a456"));
        assert!(!is_ticket_number("１２３４５６"));
    }

    #[test]
    fn serializes_box_as_xywh() {
        let c = Candidate::new(
            "123456",
            91.0,
            Some(BoundingBox::new(10.0, 20.0, 70.0, 45.0).into()),
        )
        .unwrap();
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "number": "123456",
                "confidence": 91.0,
                "box": { "x": 10.0, "y": 20.0, "w": 60.0, "h": 25.0 }
            })
        );
    }

    #[test]
    fn box_is_optional() {
        let c: Candidate = serde_json::from_str(r#"{"number":"000123","confidence":91}"#).unwrap();
        assert!(c.bbox.is_none());
        assert!(!serde_json::to_string(&c).unwrap().contains("box"));
    }

    #[test]
    fn rejects_bad_numbers_and_clamps() {
        assert!(Candidate::new("12345", 50.0, None).is_none());
        assert_eq!(Candidate::new("123456", 130.0, None).unwrap().confidence, 100.0);
    }
}

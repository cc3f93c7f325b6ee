//! Parser for Tesseract's hOCR report.
//!
//! Words are `ocrx_word` spans (`title='bbox x0 y0 x1 y1; x_wconf N'`). With
//! `hocr_char_boxes=1` each word also nests one `ocrx_cinfo` span per glyph
//! (`title='x_bboxes x0 y0 x1 y1; x_conf N'`), which become `symbols`.

use super::{BoundingBox, Recognition, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Word,
    Glyph,
    Other,
}

/// Word or glyph being collected until its closing `</span>`.
#[derive(Default)]
struct Open {
    bbox: BoundingBox,
    confidence: f64,
    text: String,
    /// Concatenated glyph texts; preferred over `text` when present.
    glyphs: String,
}

impl Open {
    fn finish(self) -> Option<Token> {
        let text = if self.glyphs.is_empty() {
            self.text.trim()
        } else {
            self.glyphs.as_str()
        };
        if text.is_empty() {
            return None;
        }
        Some(Token::new(text, self.bbox, self.confidence))
    }
}

/// Turn an hOCR document into word and character tokens.
///
/// Glyphs without a confidence inherit their word's. Malformed markup yields
/// whatever was parsed up to that point.
pub fn parse_hocr(hocr: &str) -> Recognition {
    let mut rec = Recognition::default();
    let mut stack: Vec<Span> = Vec::new();
    let mut word: Option<Open> = None;
    let mut glyph: Option<Open> = None;

    let mut rest = hocr;
    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            push_text(rest, &mut word, &mut glyph);
            break;
        };
        push_text(&rest[..lt], &mut word, &mut glyph);
        let Some(gt) = rest[lt..].find('>') else {
            break;
        };
        let tag = &rest[lt + 1..lt + gt];
        rest = &rest[lt + gt + 1..];

        if tag.starts_with("/span") {
            match stack.pop() {
                Some(Span::Word) => {
                    if let Some(t) = word.take().and_then(Open::finish) {
                        rec.words.push(t);
                    }
                }
                Some(Span::Glyph) => {
                    if let Some(t) = glyph.take().and_then(Open::finish) {
                        if let Some(w) = word.as_mut() {
                            w.glyphs.push_str(&t.text);
                        }
                        rec.symbols.push(t);
                    }
                }
                _ => {}
            }
        } else if tag.starts_with("span") && !tag.ends_with('/') {
            let class = attr(tag, "class").unwrap_or_default();
            let title = attr(tag, "title").unwrap_or_default();
            let kind = if class.split_whitespace().any(|c| c == "ocrx_word") {
                word = Some(Open {
                    bbox: title_box(title, "bbox").unwrap_or_default(),
                    confidence: title_number(title, "x_wconf").unwrap_or(0.0),
                    ..Open::default()
                });
                Span::Word
            } else if class.split_whitespace().any(|c| c == "ocrx_cinfo") {
                let inherited = word.as_ref().map_or(0.0, |w| w.confidence);
                glyph = Some(Open {
                    bbox: title_box(title, "x_bboxes").unwrap_or_default(),
                    confidence: title_number(title, "x_conf").unwrap_or(inherited),
                    ..Open::default()
                });
                Span::Glyph
            } else {
                Span::Other
            };
            stack.push(kind);
        }
    }
    rec
}

/// Character data belongs to the innermost open glyph, else to the open word.
fn push_text(raw: &str, word: &mut Option<Open>, glyph: &mut Option<Open>) {
    if raw.is_empty() {
        return;
    }
    if let Some(target) = glyph.as_mut().or(word.as_mut()) {
        target.text.push_str(&unescape(raw));
    }
}

/// Value of `name='...'` or `name="..."` inside a start tag.
fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search = tag;
    loop {
        let at = search.find(name)?;
        let after = &search[at + name.len()..];
        let preceded_by_space = search[..at].ends_with(char::is_whitespace);
        if let (true, Some(rest)) = (preceded_by_space, after.strip_prefix('=')) {
            let quote = rest.chars().next()?;
            if quote != '\'' && quote != '"' {
                return None;
            }
            let value = &rest[1..];
            return value.find(quote).map(|end| &value[..end]);
        }
        search = after;
    }
}

/// Whitespace-separated values of one `key v1 v2 ...` property in a title.
fn title_values<'a>(title: &'a str, key: &str) -> Option<Vec<&'a str>> {
    title.split(';').find_map(|prop| {
        let mut parts = prop.split_whitespace();
        (parts.next() == Some(key)).then(|| parts.collect())
    })
}

fn title_box(title: &str, key: &str) -> Option<BoundingBox> {
    let values = title_values(title, key)?;
    let n: Vec<f64> = values.iter().filter_map(|v| v.parse().ok()).collect();
    match n[..] {
        [x0, y0, x1, y1, ..] => Some(BoundingBox::new(x0, y0, x1, y1)),
        _ => None,
    }
}

fn title_number(title: &str, key: &str) -> Option<f64> {
    title_values(title, key)?.first()?.parse().ok()
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_GLYPHS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
 <body>
  <div class='ocr_page' id='page_1' title='image "pre_0.png"; bbox 0 0 1440 900; ppageno 0'>
   <div class='ocr_carea' id='block_1_1' title="bbox 102 340 712 398">
    <p class='ocr_par' id='par_1_1' lang='eng' title="bbox 102 340 712 398">
     <span class='ocr_line' id='line_1_1' title="bbox 102 340 712 398; baseline 0 -8; x_size 58">
      <span class='ocrx_word' id='word_1_1' title='bbox 102 340 282 398; x_wconf 91'>
       <span class='ocrx_cinfo' title='x_bboxes 102 340 160 398; x_conf 98.5'>1</span>
       <span class='ocrx_cinfo' title='x_bboxes 162 340 220 398; x_conf 90.25'>2</span>
       <span class='ocrx_cinfo' title='x_bboxes 224 340 282 398'>3</span>
      </span>
      <span class='ocrx_word' id='word_1_2' title='bbox 300 342 482 398; x_wconf 88'><strong>456</strong></span>
     </span>
    </p>
   </div>
  </div>
 </body>
</html>
"#;

    #[test]
    fn parses_words_and_glyphs() {
        let rec = parse_hocr(WITH_GLYPHS);

        let words: Vec<&str> = rec.words.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["123", "456"]);
        assert_eq!(rec.words[0].bbox, BoundingBox::new(102.0, 340.0, 282.0, 398.0));
        assert_eq!(rec.words[0].confidence, 91.0);
        assert_eq!(rec.words[1].confidence, 88.0);

        let glyphs: Vec<&str> = rec.symbols.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(glyphs, vec!["1", "2", "3"]);
        assert_eq!(rec.symbols[1].bbox, BoundingBox::new(162.0, 340.0, 220.0, 398.0));
        assert_eq!(rec.symbols[1].confidence, 90.25);
        // no x_conf: inherits the word's
        assert_eq!(rec.symbols[2].confidence, 91.0);
    }

    #[test]
    fn glyph_gaps_come_from_real_geometry() {
        let rec = parse_hocr(WITH_GLYPHS);
        let gaps: Vec<f64> = rec
            .symbols
            .windows(2)
            .map(|p| p[1].bbox.x0 - p[0].bbox.x1)
            .collect();
        assert_eq!(gaps, vec![2.0, 4.0]);
    }

    #[test]
    fn blank_words_and_entities() {
        let rec = parse_hocr(
            "<span class='ocrx_word' title='bbox 0 0 5 5; x_wconf 10'> </span>\
             <span class=\"ocrx_word\" title=\"bbox 1 2 3 4; x_wconf 95\">7&amp;8</span>",
        );
        assert_eq!(rec.words.len(), 1);
        assert_eq!(rec.words[0].text, "7&8");
        assert_eq!(rec.words[0].bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert!(rec.symbols.is_empty());
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_hocr("").is_empty());
        assert!(parse_hocr("Error opening data file /usr/share/tessdata/eng.traineddata\n").is_empty());
        assert!(parse_hocr("<span class='ocrx_word' title='bbox 1 2 3 4'>12").is_empty());
    }
}

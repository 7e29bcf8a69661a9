//! Source map (revision 3) construction.
//!
//! Maps are tracked at line granularity: every generated line may point back
//! to a line of one original source. That is exact for concatenation, which
//! only shifts lines, and is what the script pipeline needs in development
//! mode. Compiled stylesheets carry a map with sources and contents but no
//! mappings, since the compiler does not report positions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// One mapping from a generated column to an original position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_column: u32,
    pub source: u32,
    pub original_line: u32,
    pub original_column: u32,
}

/// Comment syntax used when embedding a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `/*# ... */`
    Css,
    /// `//# ...`
    Js,
}

/// An in-memory source map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
    /// Original source names
    pub sources: Vec<String>,
    /// Original source texts, parallel to `sources`
    pub sources_content: Vec<Option<String>>,
    /// Segments per generated line
    lines: Vec<Vec<Segment>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    sources_content: &'a [Option<String>],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    /// Map where line `n` of the output is line `n` of `source`.
    pub fn identity(source: &str, contents: &str) -> Self {
        let line_count = contents.split('\n').count();
        let lines = (0..line_count)
            .map(|line| {
                vec![Segment {
                    generated_column: 0,
                    source: 0,
                    original_line: line as u32,
                    original_column: 0,
                }]
            })
            .collect();
        Self {
            sources: vec![source.to_string()],
            sources_content: vec![Some(contents.to_string())],
            lines,
        }
    }

    /// Map that names its sources but carries no mappings.
    pub fn sources_only(sources: Vec<(String, Option<String>)>) -> Self {
        let (sources, sources_content) = sources.into_iter().unzip();
        Self { sources, sources_content, lines: vec![] }
    }

    /// Number of generated lines with mapping data.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Segments of a generated line.
    pub fn line(&self, index: usize) -> &[Segment] {
        self.lines.get(index).map(|l| l.as_slice()).unwrap_or(&[])
    }

    /// Merge `other` so that its first line lands on generated line `line_offset`.
    pub fn append(&mut self, other: &SourceMap, line_offset: usize) {
        let source_offset = self.sources.len() as u32;
        self.sources.extend(other.sources.iter().cloned());
        self.sources_content.extend(other.sources_content.iter().cloned());

        let needed = line_offset + other.lines.len();
        if self.lines.len() < needed {
            self.lines.resize_with(needed, Vec::new);
        }
        for (i, segments) in other.lines.iter().enumerate() {
            let target = &mut self.lines[line_offset + i];
            target.extend(segments.iter().map(|s| Segment { source: s.source + source_offset, ..*s }));
            target.sort_by_key(|s| s.generated_column);
        }
    }

    /// Encode the `mappings` field.
    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source = 0i64;
        let mut prev_line = 0i64;
        let mut prev_column = 0i64;

        for (i, segments) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut prev_generated = 0i64;
            for (j, seg) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                encode_vlq(&mut out, seg.generated_column as i64 - prev_generated);
                encode_vlq(&mut out, seg.source as i64 - prev_source);
                encode_vlq(&mut out, seg.original_line as i64 - prev_line);
                encode_vlq(&mut out, seg.original_column as i64 - prev_column);
                prev_generated = seg.generated_column as i64;
                prev_source = seg.source as i64;
                prev_line = seg.original_line as i64;
                prev_column = seg.original_column as i64;
            }
        }
        out
    }

    /// Serialize as source map JSON.
    pub fn to_json(&self, file: &str) -> String {
        let raw = RawSourceMap {
            version: 3,
            file,
            sources: &self.sources,
            sources_content: &self.sources_content,
            names: [],
            mappings: self.mappings(),
        };
        // Serializing strings and vectors cannot fail
        serde_json::to_string(&raw).unwrap_or_default()
    }

    /// Trailing comment that embeds the map as a base64 data URI.
    pub fn inline_comment(&self, file: &str, style: CommentStyle) -> String {
        let url = format!(
            "data:application/json;charset=utf8;base64,{}",
            STANDARD.encode(self.to_json(file))
        );
        match style {
            CommentStyle::Css => format!("/*# sourceMappingURL={} */", url),
            CommentStyle::Js => format!("//# sourceMappingURL={}", url),
        }
    }
}

/// Append the base64 VLQ encoding of `value`.
fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_CHARS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut s = String::new();
        encode_vlq(&mut s, value);
        s
    }

    #[test]
    fn test_encode_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_identity_mappings() {
        let map = SourceMap::identity("a.js", "one\ntwo\nthree");
        assert_eq!(map.line_count(), 3);
        assert_eq!(map.mappings(), "AAAA;AACA;AACA");
    }

    #[test]
    fn test_append_shifts_lines_and_sources() {
        let mut map = SourceMap::identity("a.js", "a1\na2");
        let b = SourceMap::identity("b.js", "b1\nb2");
        map.append(&b, 2);

        assert_eq!(map.sources, vec!["a.js", "b.js"]);
        assert_eq!(map.line_count(), 4);
        let seg = map.line(2)[0];
        assert_eq!(seg.source, 1);
        assert_eq!(seg.original_line, 0);
        assert_eq!(map.mappings(), "AAAA;AACA;ACDA;AACA");
    }

    #[test]
    fn test_sources_only_has_empty_mappings() {
        let map = SourceMap::sources_only(vec![("main.scss".to_string(), None)]);
        assert_eq!(map.mappings(), "");
        let json: serde_json::Value = serde_json::from_str(&map.to_json("main.css")).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "main.css");
        assert_eq!(json["sources"][0], "main.scss");
        assert!(json["sourcesContent"][0].is_null());
    }

    #[test]
    fn test_inline_comment_styles() {
        let map = SourceMap::identity("a.js", "x");
        let js = map.inline_comment("app.min.js", CommentStyle::Js);
        assert!(js.starts_with("//# sourceMappingURL=data:application/json;charset=utf8;base64,"));

        let css = map.inline_comment("main.min.css", CommentStyle::Css);
        assert!(css.starts_with("/*# sourceMappingURL="));
        assert!(css.ends_with(" */"));

        let encoded = js.rsplit(',').next().unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["file"], "app.min.js");
    }
}

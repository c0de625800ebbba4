//! Marker parser
//!
//! Markers are function calls embedded in rule expressions and payload
//! templates:
//!
//! ```text
//! read    := ("ReadFromMemory" | "Read") ws* "(" arg ")" indexer?
//! script  := "::" ( "(" ident ws* "(" arg ")" ")" | "."? ident ws* "(" arg ")" )
//! arg     := any text with balanced parentheses; quoted text is skipped
//! indexer := "[" quoted-or-bare "]"
//! ```
//!
//! A read marker must not be preceded by an identifier character, so
//! `MyRead('x')` is plain text. A call without its closing parenthesis is
//! not a marker.

use std::ops::Range;

/// Read-from-memory keywords, longest first
pub const READ_MARKERS: [&str; 2] = ["ReadFromMemory", "Read"];

/// Script invocation prefix
pub const SCRIPT_MARKER: &str = "::";

/// Calculation marker, stripped before scalar evaluation
pub const CALC_MARKER: &str = "Calc";

/// Replaced by the inbound payload
pub const INPUT_MARKER: &str = "input";

/// `Read('topic')['key']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMarker {
    /// Byte range of the whole marker, indexer included
    pub span: Range<usize>,
    /// Topic name with surrounding quotes removed
    pub topic: String,
    /// Key of a trailing `[...]` indexer, quotes removed
    pub indexer: Option<String>,
}

/// `::name(argument)` or `::(name(argument))`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCall {
    pub span: Range<usize>,
    pub name: String,
    /// Raw argument text between the parentheses
    pub argument: String,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => return None,
        }
        while matches!(self.peek(), Some(b) if is_ident_byte(b)) {
            self.pos += 1;
        }
        Some(start..self.pos)
    }

    /// Parse `"(" arg ")"`, returning the argument range
    fn parenthesized(&mut self) -> Option<Range<usize>> {
        if !self.eat(b'(') {
            return None;
        }
        let start = self.pos;
        let mut depth = 1usize;
        let mut quote: Option<u8> = None;

        while let Some(b) = self.peek() {
            self.pos += 1;
            if let Some(q) = quote {
                if b == q {
                    quote = None;
                }
                continue;
            }
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(start..self.pos - 1);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Parse `"[" key "]"`, returning the key range
    fn indexer(&mut self) -> Option<Range<usize>> {
        if !self.eat(b'[') {
            return None;
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b']' {
                return Some(start..self.pos - 1);
            }
        }
        None
    }
}

/// Strip whitespace and any single or double quotes around a name
pub fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim()
        .to_string()
}

/// First read marker at or after byte offset `from`
pub fn find_read_marker(text: &str, from: usize) -> Option<ReadMarker> {
    let bytes = text.as_bytes();
    let mut search = from;

    while let Some(relative) = text.get(search..)?.find(READ_MARKERS[1]) {
        let start = search + relative;
        search = start + 1;

        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }

        for keyword in READ_MARKERS {
            if !text[start..].starts_with(keyword) {
                continue;
            }
            let mut cursor = Cursor::new(text, start + keyword.len());
            cursor.skip_ws();
            let Some(arg) = cursor.parenthesized() else {
                continue;
            };

            let topic = unquote(&text[arg]);
            let call_end = cursor.pos;
            let indexer = cursor.indexer().map(|key| unquote(&text[key]));
            let end = if indexer.is_some() { cursor.pos } else { call_end };

            return Some(ReadMarker {
                span: start..end,
                topic,
                indexer,
            });
        }
    }
    None
}

/// All non-overlapping read markers, in order
pub fn read_markers(text: &str) -> Vec<ReadMarker> {
    let mut markers = Vec::new();
    let mut from = 0;
    while let Some(marker) = find_read_marker(text, from) {
        from = marker.span.end;
        markers.push(marker);
    }
    markers
}

/// First script call at or after byte offset `from`
pub fn find_script_call(text: &str, from: usize) -> Option<ScriptCall> {
    let mut search = from;

    while let Some(relative) = text.get(search..)?.find(SCRIPT_MARKER) {
        let start = search + relative;
        search = start + SCRIPT_MARKER.len();

        if let Some(call) = parse_script_call(text, start) {
            return Some(call);
        }
    }
    None
}

fn parse_script_call(text: &str, start: usize) -> Option<ScriptCall> {
    let mut cursor = Cursor::new(text, start + SCRIPT_MARKER.len());

    let wrapped = cursor.eat(b'(');
    if !wrapped {
        cursor.eat(b'.');
    }

    let name = cursor.ident()?;
    cursor.skip_ws();
    let argument = cursor.parenthesized()?;

    if wrapped {
        cursor.skip_ws();
        if !cursor.eat(b')') {
            return None;
        }
    }

    Some(ScriptCall {
        span: start..cursor.pos,
        name: text[name].to_string(),
        argument: text[argument].trim().to_string(),
    })
}

/// Number of script markers in `text`, parsed or not
pub fn script_marker_count(text: &str) -> usize {
    text.matches(SCRIPT_MARKER).count()
}

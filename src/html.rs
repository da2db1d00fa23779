//! Just enough HTML tokenizing to pull a `<title>` out of a truncated page.

/// A lexical unit of an HTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Opening tag, name lowercased. Attributes are skipped.
    Start(String),
    /// Closing tag, name lowercased.
    End(String),
    Text(&'a str),
}

/// Streaming tokenizer over a borrowed document. Comments, doctypes and
/// processing instructions are skipped; an unterminated construct at the end
/// of the input swallows the rest, which is what a truncated read looks like.
pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Consume raw text up to the closing tag `name` (case-insensitive) and
    /// return it undecoded. Used for elements whose content is not markup.
    pub fn raw_text_until(&mut self, name: &str) -> &'a str {
        let rest = &self.src[self.pos..];
        let needle = format!("</{name}");
        match find_ascii_ci(rest, &needle) {
            Some(i) => {
                let text = &rest[..i];
                self.pos += i;
                text
            }
            None => {
                self.pos = self.src.len();
                rest
            }
        }
    }

    fn skip_past(&mut self, pat: &str) {
        match self.src[self.pos..].find(pat) {
            Some(i) => self.pos += i + pat.len(),
            None => self.pos = self.src.len(),
        }
    }

    /// Skip to just past the `>` closing the current tag, honouring quoted
    /// attribute values.
    fn skip_tag_body(&mut self) {
        let mut quote: Option<u8> = None;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            self.pos += 1;
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"') | (None, b'\'') => quote = Some(b),
                (None, b'>') => return,
                _ => {}
            }
        }
    }

    fn read_name(&mut self) -> String {
        let rest = &self.src[self.pos..];
        let len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b':')
            .count();
        self.pos += len;
        rest[..len].to_ascii_lowercase()
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return None;
            }

            if rest.starts_with("<!--") {
                self.pos += 4;
                self.skip_past("-->");
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(">");
                continue;
            }
            if rest.starts_with("</") && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.pos += 2;
                let name = self.read_name();
                self.skip_tag_body();
                return Some(Token::End(name));
            }
            if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.pos += 1;
                let name = self.read_name();
                self.skip_tag_body();
                return Some(Token::Start(name));
            }

            // Text runs to the next '<'; a stray '<' is itself text.
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..]
                .find('<')
                .map(|i| i + first)
                .unwrap_or(rest.len());
            self.pos += end;
            return Some(Token::Text(&rest[..end]));
        }
    }
}

/// Text of the first `<title>` element, entity-decoded with whitespace
/// collapsed. Empty titles count as missing.
pub fn extract_title(html: &str) -> Option<String> {
    let mut tokens = Tokenizer::new(html);
    while let Some(tok) = tokens.next() {
        if let Token::Start(name) = tok {
            if name == "title" {
                let raw = tokens.raw_text_until("title");
                let text = collapse_whitespace(&decode_entities(raw));
                return (!text.is_empty()).then_some(text);
            }
        }
    }
    None
}

/// Decode the handful of character references that show up in page titles.
/// Unknown references are left as written.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&i| i <= 10).and_then(|semi| {
            let ch = decode_reference(&after[..semi])?;
            Some((ch, semi + 1))
        });
        match decoded {
            Some((ch, used)) => {
                out.push(ch);
                rest = &after[used..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

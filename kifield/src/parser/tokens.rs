//! Line tokenizer and keyed records for the legacy KiCad text formats.
//!
//! Legacy files store each record as one line of whitespace-separated
//! tokens, where a token may contain a double-quoted string with embedded
//! spaces. A [`Schema`] names each token position so callers read and write
//! values by key instead of by index.

/// Split a line on whitespace, keeping double-quoted runs (and their quotes)
/// together. `\"` inside a quoted run does not close it.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Wrap a value in double quotes, escaping embedded quotes.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Remove one layer of surrounding quotes and unescape `\"`.
pub fn unquote(token: &str) -> String {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return token[1..token.len() - 1].replace("\\\"", "\"");
        }
    }
    token.to_string()
}

/// Pull the quoted part out of a `Key="value"` token.
pub fn keyed_value(token: &str) -> Option<String> {
    let (_, value) = token.split_once('=')?;
    Some(unquote(value))
}

/// Ordered `(key, default)` pairs describing the tokens of one record type.
pub type Schema = &'static [(&'static str, &'static str)];

/// One tokenized line, addressable by key.
///
/// A record remembers the line it was decoded from and writes it back
/// unchanged until a value is modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    tag: String,
    schema: Schema,
    values: Vec<String>,
    extra: Vec<String>,
    raw: Option<String>,
}

impl Record {
    /// A fresh record holding the schema's default values.
    pub fn new(tag: &str, schema: Schema) -> Self {
        Record {
            tag: tag.to_string(),
            schema,
            values: schema.iter().map(|(_, d)| d.to_string()).collect(),
            extra: Vec::new(),
            raw: None,
        }
    }

    /// Decode the tokens following the tag onto the schema. Keys without a
    /// token take the schema default; surplus tokens are kept and written back.
    pub fn decode(tag: &str, schema: Schema, line: &str, tokens: &[String]) -> Self {
        let mut values: Vec<String> = tokens.iter().take(schema.len()).cloned().collect();
        values.extend(schema[values.len()..].iter().map(|(_, d)| d.to_string()));
        let extra = tokens.iter().skip(schema.len()).cloned().collect();
        Record {
            tag: tag.to_string(),
            schema,
            values,
            extra,
            raw: Some(line.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: &str) {
        if self.tag != tag {
            self.tag = tag.to_string();
            self.raw = None;
        }
    }

    fn index(&self, key: &str) -> Option<usize> {
        self.schema.iter().position(|(k, _)| *k == key)
    }

    /// Raw token for `key`, quotes included. Unknown keys read as empty.
    pub fn get(&self, key: &str) -> &str {
        self.index(key)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Token for `key` with surrounding quotes removed.
    pub fn get_unquoted(&self, key: &str) -> String {
        unquote(self.get(key))
    }

    /// Replace the raw token for `key`. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if let Some(i) = self.index(key) {
            let value = value.into();
            if self.values[i] != value {
                self.values[i] = value;
                self.raw = None;
            }
        }
    }

    /// Store `value` quoted.
    pub fn set_quoted(&mut self, key: &str, value: &str) {
        self.set(key, quote(value));
    }

    /// Write the record as a line, without the trailing newline.
    pub fn encode(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut line = self.tag.clone();
        for value in self.values.iter().chain(self.extra.iter()) {
            line.push(' ');
            line.push_str(value);
        }
        line.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F_SCHEMA: Schema = &[("id", ""), ("ref", "\"\""), ("orient", "H"), ("name", "")];

    #[test]
    fn test_tokenize_quotes() {
        let tokens = tokenize(r#"F 4 "Part \"A\" rev" H 100"#);
        assert_eq!(tokens, vec!["F", "4", r#""Part \"A\" rev""#, "H", "100"]);
    }

    #[test]
    fn test_tokenize_keyed_tokens() {
        let tokens = tokenize(r#"AR Path="/5A1/5B2" Ref="R 1"  Part="1""#);
        assert_eq!(tokens, vec!["AR", r#"Path="/5A1/5B2""#, r#"Ref="R 1""#, r#"Part="1""#]);
        assert_eq!(keyed_value(&tokens[2]).as_deref(), Some("R 1"));
    }

    #[test]
    fn test_quote_roundtrip() {
        let value = r#"say "hi""#;
        assert_eq!(unquote(&quote(value)), value);
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("\"\""), "");
    }

    #[test]
    fn test_decode_fills_missing_keys() {
        let line = r#"F 0 "R1""#;
        let tokens = tokenize(line);
        let record = Record::decode("F", F_SCHEMA, line, &tokens[1..]);
        assert_eq!(record.get("ref"), "\"R1\"");
        assert_eq!(record.get("orient"), "H");
        assert_eq!(record.get("name"), "");
        assert_eq!(record.encode(), line);
    }

    #[test]
    fn test_modified_short_record_reparses() {
        const SCHEMA: Schema = &[("id", ""), ("ref", "\"\""), ("orient", "H"), ("attributs", "0001")];
        let line = r#"F 4 "X""#;
        let tokens = tokenize(line);
        let mut record = Record::decode("F", SCHEMA, line, &tokens[1..]);
        record.set("attributs", "0000");
        let written = record.encode();
        assert_eq!(written, r#"F 4 "X" H 0000"#);

        let tokens = tokenize(&written);
        let reread = Record::decode("F", SCHEMA, &written, &tokens[1..]);
        assert_eq!(reread.get("orient"), "H");
        assert_eq!(reread.get("attributs"), "0000");
    }

    #[test]
    fn test_untouched_record_keeps_spacing() {
        let line = r#"F 1 "10k"  H"#;
        let tokens = tokenize(line);
        let mut record = Record::decode("F", F_SCHEMA, line, &tokens[1..]);
        assert_eq!(record.encode(), line);
        record.set_quoted("ref", "22k");
        assert_eq!(record.encode(), r#"F 1 "22k" H"#);
    }

    #[test]
    fn test_new_record_uses_defaults() {
        let mut record = Record::new("F", F_SCHEMA);
        record.set("id", "4");
        record.set_quoted("name", "MPN");
        assert_eq!(record.encode(), r#"F 4 "" H "MPN""#);
    }
}

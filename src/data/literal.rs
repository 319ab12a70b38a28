//! Parser for the serialized `problems` column
//!
//! The column holds a Python-literal dictionary such as
//! `{'question': '...', 'choices': ['a', 'b'], 'answer': 2}`. JSON input is
//! a subset of what is accepted here (`true`/`false`/`null` are recognised).

use std::fmt;

/// A parsed literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

/// Position-tagged parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for LiteralError {}

impl Literal {
    /// Look up a string key in a dictionary literal
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
                Literal::Str(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Literal::None)
    }
}

type ParseResult<T> = std::result::Result<T, LiteralError>;

/// Parse a complete literal expression
pub fn parse(input: &str) -> ParseResult<Literal> {
    let mut parser = Parser { src: input, pos: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> ParseResult<Literal> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'') | Some('"') => self.string().map(Literal::Str),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> ParseResult<Literal> {
        self.bump();
        let mut entries = Vec::new();
        loop {
            if self.eat('}') {
                return Ok(Literal::Dict(entries));
            }
            let key = self.value()?;
            if !self.eat(':') {
                return Err(self.error("expected ':'"));
            }
            let value = self.value()?;
            entries.push((key, value));
            if self.eat(',') {
                continue;
            }
            if self.eat('}') {
                return Ok(Literal::Dict(entries));
            }
            return Err(self.error("expected ',' or '}'"));
        }
    }

    fn sequence(&mut self, open: char, close: char) -> ParseResult<Literal> {
        debug_assert_eq!(self.peek(), Some(open));
        self.bump();
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(Literal::List(items));
            }
            items.push(self.value()?);
            if self.eat(',') {
                continue;
            }
            if self.eat(close) {
                return Ok(Literal::List(items));
            }
            return Err(self.error("expected ',' or closing bracket"));
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected quote"))?;
        let triple = self.src[self.pos..].starts_with(&format!("{quote}{quote}"));
        if triple {
            self.bump();
            self.bump();
        }

        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.src[self.pos..].starts_with(&format!("{quote}{quote}")) {
                    self.bump();
                    self.bump();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error("newline in string"));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                'U' => out.push(self.hex_escape(8)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> ParseResult<char> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' || c == '+')
        {
            let prev = self.src[..self.pos].chars().last();
            let c = self.peek();
            if matches!(c, Some('-') | Some('+')) && !matches!(prev, Some('e') | Some('E')) {
                break;
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Literal::Int(i));
        }
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| LiteralError {
                offset: start,
                message: format!("invalid number '{}'", text),
            })
    }

    fn keyword(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "None" | "null" => Ok(Literal::None),
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            "nan" | "NaN" => Ok(Literal::Float(f64::NAN)),
            other => Err(LiteralError {
                offset: start,
                message: format!("unknown identifier '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_dict() {
        let value = parse(
            "{'question': '다음 중 옳은 것은?', 'choices': ['가', \"나's\"], 'answer': 2}",
        )
        .unwrap();
        assert_eq!(value.get("question").and_then(Literal::as_str), Some("다음 중 옳은 것은?"));
        let choices = value.get("choices").and_then(Literal::as_list).unwrap();
        assert_eq!(choices, &[Literal::Str("가".into()), Literal::Str("나's".into())]);
        assert_eq!(value.get("answer"), Some(&Literal::Int(2)));
    }

    #[test]
    fn test_escapes_and_keywords() {
        let value = parse(r#"{'a': 'line\nnext \'q\'', 'b': None, 'c': True, "d": null}"#).unwrap();
        assert_eq!(value.get("a").and_then(Literal::as_str), Some("line\nnext 'q'"));
        assert!(value.get("b").unwrap().is_none());
        assert_eq!(value.get("c"), Some(&Literal::Bool(true)));
        assert!(value.get("d").unwrap().is_none());
    }

    #[test]
    fn test_trailing_comma_and_tuple() {
        let value = parse("{'choices': ('x', 'y',),}").unwrap();
        assert_eq!(value.get("choices").and_then(Literal::as_list).map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse("-3").unwrap(), Literal::Int(-3));
        assert_eq!(parse("1.5e2").unwrap(), Literal::Float(150.0));
        assert!(matches!(parse("[1, -2]").unwrap(), Literal::List(ref v) if v[1] == Literal::Int(-2)));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(parse("{'question': 'unterminated}").is_err());
        assert!(parse("{'a' 1}").is_err());
        assert!(parse("{'a': 1} extra").is_err());
        assert!(parse("{'a': undefined}").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_triple_quoted_string() {
        let value = parse("'''multi\nline'''").unwrap();
        assert_eq!(value, Literal::Str("multi\nline".into()));
    }
}

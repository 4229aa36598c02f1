use super::{Comparison, Logical};
use crate::error::{Result, TableMapError};
use crate::value::{parse_datetime, Row, Value};
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use uuid::Uuid;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    Binary {
        left: Box<FilterExpr>,
        op: Logical,
        right: Box<FilterExpr>,
    },
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Whether `row` satisfies the expression. A comparison against a
    /// missing column, or between incomparable kinds, is false.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            FilterExpr::Compare { field, op, value } => match row.get(field) {
                Some(stored) => compare(&stored, value).map_or(false, |ord| satisfies(*op, ord)),
                None => false,
            },
            FilterExpr::Binary { left, op, right } => match op {
                Logical::And => left.matches(row) && right.matches(row),
                Logical::Or => left.matches(row) || right.matches(row),
            },
            FilterExpr::Not(inner) => !inner.matches(row),
        }
    }
}

/// Parse `text` and test it against `row`.
pub fn evaluate(text: &str, row: &Row) -> Result<bool> {
    Ok(parse(text)?.matches(row))
}

pub fn parse(text: &str) -> Result<FilterExpr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parse_error(format!("unexpected {token:?} at end of filter")));
    }
    Ok(expr)
}

fn satisfies(op: Comparison, ord: Ordering) -> bool {
    match op {
        Comparison::Equal => ord == Ordering::Equal,
        Comparison::NotEqual => ord != Ordering::Equal,
        Comparison::GreaterThan => ord == Ordering::Greater,
        Comparison::GreaterThanOrEqual => ord != Ordering::Less,
        Comparison::LessThan => ord == Ordering::Less,
        Comparison::LessThanOrEqual => ord != Ordering::Greater,
    }
}

fn compare(stored: &Value, literal: &Value) -> Option<Ordering> {
    use Value::*;
    match (stored, literal) {
        (String(a), String(b)) => Some(a.cmp(b)),
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Int64(a), Int64(b)) => Some(a.cmp(b)),
        (Int(a), Int64(b)) => Some(i64::from(*a).cmp(b)),
        (Int64(a), Int(b)) => Some(a.cmp(&i64::from(*b))),
        (Double(a), Double(b)) => a.partial_cmp(b),
        (Double(a), Int(b)) => a.partial_cmp(&f64::from(*b)),
        (Int(a), Double(b)) => f64::from(*a).partial_cmp(b),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Guid(a), Guid(b)) => Some(a.cmp(b)),
        (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn parse_error(message: String) -> TableMapError {
    TableMapError::FilterParse(message)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Word(String),
    Literal(Value),
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            chars.next();
            tokens.push(Token::Open);
        } else if c == ')' {
            chars.next();
            tokens.push(Token::Close);
        } else if c == '\'' {
            let text = read_quoted(&mut chars)?;
            tokens.push(Token::Literal(Value::String(text)));
        } else if c.is_ascii_digit() || c == '-' {
            tokens.push(Token::Literal(read_number(&mut chars)?));
        } else if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&'\'') {
                let body = read_quoted(&mut chars)?;
                tokens.push(Token::Literal(typed_literal(&word, &body)?));
            } else if word == "true" || word == "false" {
                tokens.push(Token::Literal(Value::Bool(word == "true")));
            } else {
                tokens.push(Token::Word(word));
            }
        } else {
            return Err(parse_error(format!("unexpected character '{c}'")));
        }
    }

    Ok(tokens)
}

/// Read a single-quoted body, folding doubled quotes.
fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    chars.next();
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\'') => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                } else {
                    return Ok(out);
                }
            }
            Some(ch) => out.push(ch),
            None => return Err(parse_error("unterminated string literal".into())),
        }
    }
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> Result<Value> {
    let mut text = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E') {
            text.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    if chars.peek() == Some(&'L') {
        chars.next();
        return text
            .parse()
            .map(Value::Int64)
            .map_err(|_| parse_error(format!("invalid int64 literal '{text}'")));
    }
    if text.contains(&['.', 'e', 'E'][..]) {
        return text
            .parse()
            .map(Value::Double)
            .map_err(|_| parse_error(format!("invalid double literal '{text}'")));
    }
    match text.parse::<i32>() {
        Ok(i) => Ok(Value::Int(i)),
        Err(_) => text
            .parse()
            .map(Value::Int64)
            .map_err(|_| parse_error(format!("invalid integer literal '{text}'"))),
    }
}

fn typed_literal(prefix: &str, body: &str) -> Result<Value> {
    match prefix {
        "datetime" => parse_datetime(body)
            .map(Value::DateTime)
            .ok_or_else(|| parse_error(format!("invalid datetime literal '{body}'"))),
        "guid" => Uuid::parse_str(body)
            .map(Value::Guid)
            .map_err(|_| parse_error(format!("invalid guid literal '{body}'"))),
        other => Err(parse_error(format!("unknown literal prefix '{other}'"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == word)
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.peek_word("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = FilterExpr::Binary {
                left: Box::new(left),
                op: Logical::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_unary()?;
        while self.peek_word("and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = FilterExpr::Binary {
                left: Box::new(left),
                op: Logical::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterExpr> {
        if self.peek_word("not") {
            self.pos += 1;
            return Ok(FilterExpr::Not(Box::new(self.parse_unary()?)));
        }
        match self.next() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    other => Err(parse_error(format!("expected ')', found {other:?}"))),
                }
            }
            Some(Token::Word(field)) => {
                let op = match self.next() {
                    Some(Token::Word(code)) => Comparison::from_code(&code)
                        .ok_or_else(|| parse_error(format!("unknown operator '{code}'")))?,
                    other => return Err(parse_error(format!("expected operator, found {other:?}"))),
                };
                match self.next() {
                    Some(Token::Literal(value)) => Ok(FilterExpr::Compare { field, op, value }),
                    other => Err(parse_error(format!("expected literal, found {other:?}"))),
                }
            }
            other => Err(parse_error(format!("expected condition, found {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{combine_all, condition, render_literal};
    use chrono::{TimeZone, Utc};

    fn instrument() -> Row {
        Row::new("Acme", "X")
            .with("Strings", 6i32)
            .with("Price", 199.5)
            .with("Owner", "O'Brien")
            .with("Electric", true)
            .with("Built", Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_parse_single_condition() {
        assert_eq!(
            parse("Strings ge 5").unwrap(),
            FilterExpr::Compare {
                field: "Strings".into(),
                op: Comparison::GreaterThanOrEqual,
                value: Value::Int(5),
            }
        );
    }

    #[test]
    fn test_literals_parse_back() {
        let values = [
            Value::from("O'Brien"),
            Value::Int(-12),
            Value::Double(3.0),
            Value::Bool(false),
            Value::Guid(Uuid::new_v4()),
            Value::DateTime(Utc.with_ymd_and_hms(2021, 2, 3, 4, 5, 6).unwrap()),
        ];
        for value in values {
            let text = format!("F eq {}", render_literal(&value).unwrap());
            match parse(&text).unwrap() {
                FilterExpr::Compare { value: parsed, .. } => assert_eq!(parsed, value),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_evaluate_rendered_filters() {
        let row = instrument();
        let fragments = vec![
            condition("PartitionKey", Comparison::Equal, &Value::from("Acme")).unwrap(),
            condition("Strings", Comparison::GreaterThanOrEqual, &Value::Int(5)).unwrap(),
        ];
        let filter = combine_all(&fragments).unwrap();
        assert!(evaluate(&filter, &row).unwrap());

        let filter = condition("Strings", Comparison::GreaterThanOrEqual, &Value::Int(7)).unwrap();
        assert!(!evaluate(&filter, &row).unwrap());
    }

    #[test]
    fn test_evaluate_kinds() {
        let row = instrument();
        assert!(evaluate("Owner eq 'O''Brien'", &row).unwrap());
        assert!(evaluate("Price gt 100", &row).unwrap());
        assert!(evaluate("Price lt 200.0", &row).unwrap());
        assert!(evaluate("Electric eq true", &row).unwrap());
        assert!(evaluate("Built lt datetime'2021-01-01T00:00:00Z'", &row).unwrap());
        assert!(evaluate("RowKey ne 'Y'", &row).unwrap());
        // Missing columns and mismatched kinds never match
        assert!(!evaluate("Color eq 'red'", &row).unwrap());
        assert!(!evaluate("Strings eq '6'", &row).unwrap());
    }

    #[test]
    fn test_or_and_not() {
        let row = instrument();
        assert!(evaluate("(Strings eq 4) or (Strings eq 6)", &row).unwrap());
        assert!(evaluate("not (Strings eq 4)", &row).unwrap());
        assert!(!evaluate("(Strings eq 6) and (not (Electric eq true))", &row).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("Strings").is_err());
        assert!(parse("Strings like 5").is_err());
        assert!(parse("Owner eq 'open").is_err());
        assert!(parse("(Strings eq 5").is_err());
        assert!(parse("Strings eq 5 6").is_err());
        assert!(parse("Id eq guid'nope'").is_err());
        assert!(matches!(parse("#").unwrap_err(), TableMapError::FilterParse(_)));
    }
}

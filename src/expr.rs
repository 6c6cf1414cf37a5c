//! Text filter expressions.
//!
//! Supports expressions like:
//! - `height > 1.8`
//! - `size == 'large'`
//! - `height > 1.8 AND name != 'Bob'`
//! - `(age >= 18) OR NOT (group == 'control')`
//! - `born < '1990-01-01'`
//! - `weight IS NULL`, `weight IS NOT NULL`
//!
//! Names with spaces are written in backticks: `` `body mass` < 20 ``.
//!
//! An expression is parsed into a small syntax tree and then lowered to a
//! [`Filter`] according to the kind of each variable it names.

use crate::domain::Domain;
use crate::error::{Result, TableError};
use crate::filter::{Filter, FilterContinuous, FilterDiscrete, FilterOperator, FilterString, IsDefined, Values};
use crate::value::Value;
use crate::variable::{parse_time, Variable};

/// A parsed expression, before it is bound to a domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Compare column to a literal value
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    IsNull { column: String },
    IsNotNull { column: String },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

impl CompareOp {
    fn operator(self) -> FilterOperator {
        match self {
            CompareOp::Eq => FilterOperator::Equal,
            CompareOp::Ne => FilterOperator::NotEqual,
            CompareOp::Lt => FilterOperator::Less,
            CompareOp::Le => FilterOperator::LessEqual,
            CompareOp::Gt => FilterOperator::Greater,
            CompareOp::Ge => FilterOperator::GreaterEqual,
        }
    }
}

/// Literal values that can appear in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Text(String),
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Is,
    LParen,
    RParen,
    Eof,
}

// ==================== Lexer ====================

struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.advance();
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> std::result::Result<Token, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+') && matches!(self.input.get(self.pos - 1), Some('e') | Some('E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.input[start..self.pos].iter().collect();
        text.parse()
            .map(Token::Number)
            .map_err(|_| format!("invalid number '{}'", text))
    }

    /// Read up to the closing `quote`; backslash escapes the next character.
    fn read_quoted(&mut self, quote: char) -> std::result::Result<String, String> {
        self.advance();
        let mut s = String::new();
        while let Some(c) = self.advance() {
            if c == quote {
                return Ok(s);
            }
            if c == '\\' {
                match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(escaped) => s.push(escaped),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err("unterminated string".to_string())
    }

    fn next_token(&mut self) -> std::result::Result<Token, String> {
        self.skip_whitespace();
        let c = match self.peek() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };
        let two = |lexer: &mut Lexer, single: Token, double: Token| {
            lexer.advance();
            if lexer.peek() == Some('=') {
                lexer.advance();
                double
            } else {
                single
            }
        };
        match c {
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }
            // A single '=' also means equality.
            '=' => Ok(two(self, Token::Eq, Token::Eq)),
            '!' => Ok(two(self, Token::Not, Token::Ne)),
            '<' => Ok(two(self, Token::Lt, Token::Le)),
            '>' => Ok(two(self, Token::Gt, Token::Ge)),
            '\'' | '"' => self.read_quoted(c).map(Token::Text),
            '`' => self.read_quoted('`').map(Token::Ident),
            '-' if self.input.get(self.pos + 1).map_or(false, |n| n.is_ascii_digit() || *n == '.') => {
                self.advance();
                match self.read_number()? {
                    Token::Number(v) => Ok(Token::Number(-v)),
                    other => Ok(other),
                }
            }
            _ if c.is_ascii_digit() || c == '.' => self.read_number(),
            _ if c.is_alphabetic() || c == '_' => {
                let ident = self.read_ident();
                Ok(match ident.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "IS" => Token::Is,
                    "NULL" => Token::Null,
                    _ => Token::Ident(ident),
                })
            }
            _ => Err(format!("unexpected character '{}'", c)),
        }
    }
}

// ==================== Parser ====================

struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    fn new(input: &str) -> std::result::Result<Self, String> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> std::result::Result<(), String> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> std::result::Result<(), String> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(format!("expected {:?}, got {:?}", expected, self.current))
        }
    }

    fn parse(&mut self) -> std::result::Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_not()?;
        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> std::result::Result<Expr, String> {
        if self.current == Token::Not {
            self.advance()?;
            let expr = self.parse_not()?;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> std::result::Result<Expr, String> {
        if self.current == Token::LParen {
            self.advance()?;
            let expr = self.parse()?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        let column = match &self.current {
            Token::Ident(name) => name.clone(),
            other => return Err(format!("expected column name, got {:?}", other)),
        };
        self.advance()?;

        if self.current == Token::Is {
            self.advance()?;
            let negated = self.current == Token::Not;
            if negated {
                self.advance()?;
            }
            if self.current != Token::Null {
                return Err("expected NULL after IS".to_string());
            }
            self.advance()?;
            return Ok(if negated {
                Expr::IsNotNull { column }
            } else {
                Expr::IsNull { column }
            });
        }

        let op = match &self.current {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            other => return Err(format!("expected comparison operator, got {:?}", other)),
        };
        self.advance()?;

        let value = match &self.current {
            Token::Number(v) => Literal::Number(*v),
            Token::Text(s) => Literal::Text(s.clone()),
            Token::Null => Literal::Null,
            other => return Err(format!("expected literal value, got {:?}", other)),
        };
        self.advance()?;

        Ok(Expr::Compare { column, op, value })
    }
}

/// Parse an expression string into an [`Expr`].
pub fn parse_expr(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input).map_err(TableError::Expression)?;
    let expr = parser.parse().map_err(TableError::Expression)?;
    if parser.current != Token::Eof {
        return Err(TableError::Expression(format!(
            "unexpected token after expression: {:?}",
            parser.current
        )));
    }
    Ok(expr)
}

// ==================== Lowering ====================

/// Parse `input` and bind it to `domain`, producing a filter.
///
/// Comparisons become continuous, discrete or string filters by the kind of
/// the named variable. Discrete variables only support `==` and `!=`; time
/// variables accept ISO 8601 strings.
pub fn parse_filter(input: &str, domain: &Domain) -> Result<Filter> {
    let expr = parse_expr(input)?;
    let filter = lower(&expr, domain)?;
    log::debug!("parsed filter expression '{}' as {}", input, filter);
    Ok(filter)
}

fn lower(expr: &Expr, domain: &Domain) -> Result<Filter> {
    match expr {
        Expr::IsNull { column } => {
            domain.index(column.as_str())?;
            Ok(IsDefined {
                columns: Some(vec![column.as_str().into()]),
                negate: true,
            }
            .into())
        }
        Expr::IsNotNull { column } => {
            domain.index(column.as_str())?;
            Ok(IsDefined::columns([column.as_str()]).into())
        }
        Expr::And(_, _) => Ok(Values::all(flatten(expr, domain, true)?).into()),
        Expr::Or(_, _) => Ok(Values::any(flatten(expr, domain, false)?).into()),
        Expr::Not(inner) => Ok(lower(inner, domain)?.negate()),
        Expr::Compare { column, op, value } => {
            let var = domain.get(column.as_str())?;
            compare(var, *op, value)
        }
    }
}

/// Conditions of a chain of ANDs (or ORs) as one list.
fn flatten(expr: &Expr, domain: &Domain, conjunction: bool) -> Result<Vec<Filter>> {
    match (expr, conjunction) {
        (Expr::And(left, right), true) | (Expr::Or(left, right), false) => {
            let mut out = flatten(left, domain, conjunction)?;
            out.extend(flatten(right, domain, conjunction)?);
            Ok(out)
        }
        _ => Ok(vec![lower(expr, domain)?]),
    }
}

fn compare(var: &Variable, op: CompareOp, value: &Literal) -> Result<Filter> {
    let name = var.name();
    if *value == Literal::Null {
        return Err(TableError::Expression(format!(
            "compare '{}' with NULL using IS NULL or IS NOT NULL",
            name
        )));
    }
    if var.is_discrete() {
        let label = match value {
            Literal::Text(s) => Value::from(s.as_str()),
            Literal::Number(v) => Value::Number(*v),
            Literal::Null => Value::missing(),
        };
        let filter: Filter = FilterDiscrete::new(name, [label]).into();
        return match op {
            CompareOp::Eq => Ok(filter),
            CompareOp::Ne => Ok(filter.negate()),
            _ => Err(TableError::Expression(format!(
                "discrete variable '{}' supports only == and !=",
                name
            ))),
        };
    }
    if var.is_string() {
        let reference = match value {
            Literal::Text(s) => s.clone(),
            Literal::Number(v) => v.to_string(),
            Literal::Null => String::new(),
        };
        return Ok(FilterString::new(name, op.operator(), reference).into());
    }
    let reference = match value {
        Literal::Number(v) => *v,
        Literal::Text(s) if var.is_time() => parse_time(s).ok_or_else(|| {
            TableError::Expression(format!("'{}' is not a time for '{}'", s, name))
        })?,
        Literal::Text(s) => s.trim().parse().map_err(|_| {
            TableError::Expression(format!("'{}' is not a number for '{}'", s, name))
        })?,
        Literal::Null => f64::NAN,
    };
    Ok(FilterContinuous::new(name, op.operator(), reference).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterKind, RowFilter};
    use crate::table::Table;

    fn domain() -> Domain {
        Domain::new(
            vec![
                Variable::continuous("height"),
                Variable::discrete("size", ["small", "large"]).unwrap(),
                Variable::continuous("body mass"),
            ],
            vec![Variable::time("born")],
            vec![Variable::string("name")],
        )
        .unwrap()
    }

    fn people() -> Table {
        let rows = vec![
            vec![1.6.into(), "small".into(), 20.0.into(), "1990-05-01".into(), "ann".into()],
            vec![1.9.into(), "large".into(), 25.0.into(), "1985-01-01".into(), "bob".into()],
            vec!["?".into(), "large".into(), 19.0.into(), "2001-12-24".into(), "cy".into()],
            vec![1.7.into(), "?".into(), "?".into(), "?".into(), "".into()],
        ];
        Table::from_list(domain(), &rows, None).unwrap()
    }

    fn names(filter: &Filter) -> Vec<String> {
        let out = filter.apply(&people()).unwrap();
        out.get_column("name", false)
            .unwrap()
            .to_values()
            .iter()
            .map(|v| if v.is_missing() { "?".to_string() } else { v.to_string() })
            .collect()
    }

    #[test]
    fn test_parse_tree() {
        let expr = parse_expr("height > 1.8 AND NOT (size == 'small' OR name IS NULL)").unwrap();
        match expr {
            Expr::And(left, right) => {
                assert_eq!(
                    *left,
                    Expr::Compare {
                        column: "height".into(),
                        op: CompareOp::Gt,
                        value: Literal::Number(1.8)
                    }
                );
                assert!(matches!(*right, Expr::Not(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            parse_expr("`body mass` <= -2.5e1").unwrap(),
            Expr::Compare {
                column: "body mass".into(),
                op: CompareOp::Le,
                value: Literal::Number(-25.0)
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["height >", "height 1", "(height > 1", "height > 1 extra", "name == 'open", "height > 1 #"] {
            assert!(matches!(parse_expr(bad), Err(TableError::Expression(_))), "{}", bad);
        }
    }

    #[test]
    fn test_lowering_by_kind() {
        let d = domain();
        assert_eq!(parse_filter("height > 1", &d).unwrap().kind(), FilterKind::Continuous);
        assert_eq!(parse_filter("size == 'large'", &d).unwrap().kind(), FilterKind::Discrete);
        assert_eq!(parse_filter("size != 'large'", &d).unwrap().kind(), FilterKind::Not);
        assert_eq!(parse_filter("name >= 'b'", &d).unwrap().kind(), FilterKind::String);
        assert_eq!(parse_filter("name IS NOT NULL", &d).unwrap().kind(), FilterKind::IsDefined);
        assert_eq!(parse_filter("height > 1 AND height < 2 AND name == 'x'", &d).unwrap().kind(), FilterKind::Values);

        assert!(matches!(parse_filter("weight > 1", &d), Err(TableError::UnknownVariable(_))));
        assert!(matches!(parse_filter("size < 'large'", &d), Err(TableError::Expression(_))));
        assert!(matches!(parse_filter("height == NULL", &d), Err(TableError::Expression(_))));
        assert!(matches!(parse_filter("height > 'tall'", &d), Err(TableError::Expression(_))));
        assert!(matches!(parse_filter("born > 'yesterday'", &d), Err(TableError::Expression(_))));
    }

    #[test]
    fn test_filters_apply() {
        let d = domain();
        assert_eq!(names(&parse_filter("height > 1.65", &d).unwrap()), vec!["bob", "?"]);
        assert_eq!(names(&parse_filter("size == 'large'", &d).unwrap()), vec!["bob", "cy"]);
        assert_eq!(names(&parse_filter("size != 'large'", &d).unwrap()), vec!["ann", "?"]);
        assert_eq!(names(&parse_filter("born < '1995-01-01'", &d).unwrap()), vec!["ann", "bob"]);
        assert_eq!(names(&parse_filter("height IS NULL OR `body mass` < 20", &d).unwrap()), vec!["cy"]);
        assert_eq!(names(&parse_filter("name IS NULL", &d).unwrap()), vec!["?"]);
        assert_eq!(
            names(&parse_filter("NOT (size == 'small') AND name >= 'b'", &d).unwrap()),
            vec!["bob", "cy"]
        );
    }
}

//! Generic boolean clause parser
//!
//! Handles `and`, `or`, `not`, parentheses and the `true`/`false` literals.
//! Everything between connectives is a leaf clause handed to a
//! [`LeafParser`]. Precedence, loosest first: `or`, `and`, `not`.
//! Keywords are case-insensitive.

use super::predicate::Predicate;
use crate::error::ParseError;

/// Turns one leaf clause (e.g. `group admin`) into a predicate
pub trait LeafParser {
    fn parse_leaf(&self, clause: &str) -> Result<Predicate, ParseError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Word(String),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn is_connective(&self) -> bool {
        self.is_keyword("and") || self.is_keyword("or") || self.is_keyword("not")
    }
}

/// Boolean clause parser parameterized by its leaf parser
pub struct BooleanClauseParser<L> {
    leaf: L,
}

impl<L: LeafParser> BooleanClauseParser<L> {
    pub fn new(leaf: L) -> Self {
        BooleanClauseParser { leaf }
    }

    pub fn parse(&self, text: &str) -> Result<Predicate, ParseError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(ParseError::EmptyExpression);
        }

        let mut cursor = Cursor {
            tokens: &tokens,
            pos: 0,
            source: text,
        };
        let predicate = self.parse_or(&mut cursor)?;

        match cursor.peek() {
            None => Ok(predicate),
            Some(Token::Close) => Err(ParseError::UnbalancedParentheses(text.to_string())),
            Some(token) => Err(ParseError::UnexpectedToken(token_text(token))),
        }
    }

    fn parse_or(&self, cursor: &mut Cursor<'_>) -> Result<Predicate, ParseError> {
        let mut operands = vec![self.parse_and(cursor)?];
        while cursor.eat_keyword("or") {
            operands.push(self.operand(cursor, "or", Self::parse_and)?);
        }
        if operands.len() == 1 {
            return Ok(operands.remove(0));
        }
        Predicate::or(operands)
    }

    fn parse_and(&self, cursor: &mut Cursor<'_>) -> Result<Predicate, ParseError> {
        let mut operands = vec![self.parse_unary(cursor)?];
        while cursor.eat_keyword("and") {
            operands.push(self.operand(cursor, "and", Self::parse_unary)?);
        }
        if operands.len() == 1 {
            return Ok(operands.remove(0));
        }
        Predicate::and(operands)
    }

    fn parse_unary(&self, cursor: &mut Cursor<'_>) -> Result<Predicate, ParseError> {
        if cursor.eat_keyword("not") {
            if cursor.at_operand_end() {
                return Err(ParseError::NotArity(0));
            }
            return Ok(Predicate::not(self.parse_unary(cursor)?));
        }
        self.parse_primary(cursor)
    }

    fn parse_primary(&self, cursor: &mut Cursor<'_>) -> Result<Predicate, ParseError> {
        match cursor.peek() {
            None => Err(ParseError::EmptyExpression),
            Some(Token::Open) => {
                cursor.pos += 1;
                if matches!(cursor.peek(), Some(Token::Close)) {
                    return Err(ParseError::UnexpectedToken("()".to_string()));
                }
                let inner = self.parse_or(cursor)?;
                match cursor.peek() {
                    Some(Token::Close) => {
                        cursor.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ParseError::UnbalancedParentheses(cursor.source.to_string())),
                }
            }
            Some(Token::Close) => Err(ParseError::UnbalancedParentheses(
                cursor.source.to_string(),
            )),
            Some(token) if token.is_connective() => {
                Err(ParseError::UnexpectedToken(token_text(token)))
            }
            Some(Token::Word(_)) => {
                let clause = cursor.take_clause();
                if clause.eq_ignore_ascii_case("true") {
                    Ok(Predicate::True)
                } else if clause.eq_ignore_ascii_case("false") {
                    Ok(Predicate::False)
                } else {
                    self.leaf.parse_leaf(&clause)
                }
            }
        }
    }

    /// Right-hand operand of a connective; a missing one is reported against it
    fn operand(
        &self,
        cursor: &mut Cursor<'_>,
        connective: &str,
        next: fn(&Self, &mut Cursor<'_>) -> Result<Predicate, ParseError>,
    ) -> Result<Predicate, ParseError> {
        if cursor.at_operand_end() {
            return Err(ParseError::EmptyConnective(connective.to_string()));
        }
        next(self, cursor)
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(token) if token.is_keyword(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn at_operand_end(&self) -> bool {
        match self.peek() {
            None | Some(Token::Close) => true,
            Some(token) => token.is_keyword("and") || token.is_keyword("or"),
        }
    }

    /// Join consecutive non-keyword words into one clause
    fn take_clause(&mut self) -> String {
        let tokens = self.tokens;
        let mut words = Vec::new();
        while let Some(token) = tokens.get(self.pos) {
            let Token::Word(word) = token else { break };
            if token.is_connective() {
                break;
            }
            words.push(word.as_str());
            self.pos += 1;
        }
        words.join(" ")
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for ch in text.chars() {
        if ch == '(' || ch == ')' || ch.is_whitespace() {
            if !word.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut word)));
            }
            match ch {
                '(' => tokens.push(Token::Open),
                ')' => tokens.push(Token::Close),
                _ => {}
            }
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }

    tokens
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Open => "(".to_string(),
        Token::Close => ")".to_string(),
        Token::Word(w) => w.clone(),
    }
}

//! Element selectors used to filter dispatcher handlers.
//!
//! Supported syntax:
//!
//! | form            | matches                                    |
//! |-----------------|--------------------------------------------|
//! | `*`             | every element                              |
//! | `p`             | elements named `p` (prefixed names allowed)|
//! | `.x`            | elements whose `class` contains `x`        |
//! | `[a]`, `[a=v]`  | attribute presence or exact value          |
//! | `p.x[a]`        | compound: all of the above at once         |
//! | `a b`, `a > b`  | descendant and child combinators           |
//! | `a, b`          | either selector                            |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use wedge_tree::{Document, NodeId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorError {
    #[error("Invalid selector {selector:?} at {position}: {reason}")]
    Invalid {
        selector: String,
        position: usize,
        reason: String,
    },
}

/// Decides whether a handler applies to an element.
pub trait Matcher {
    fn matches(&self, doc: &Document, node: NodeId) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&Document, NodeId) -> bool,
{
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self(doc, node)
    }
}

/// Matches every element
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Matcher for MatchAll {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeTest {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(name) = doc.name(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|tag| tag != name) {
            return false;
        }
        self.classes.iter().all(|class| doc.has_class(node, class))
            && self.attributes.iter().all(|test| {
                match (doc.attribute(node, &test.name), &test.value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
    }
}

/// `compounds[i]` is joined to `compounds[i + 1]` by `combinators[i]`.
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.compounds
            .len()
            .checked_sub(1)
            .is_some_and(|last| self.matches_at(doc, node, last))
    }

    // Right to left, backtracking over ancestors for descendant combinators.
    fn matches_at(&self, doc: &Document, node: NodeId, i: usize) -> bool {
        if !self.compounds[i].matches(doc, node) {
            return false;
        }
        if i == 0 {
            return true;
        }
        match self.combinators[i - 1] {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|parent| self.matches_at(doc, parent, i - 1)),
            Combinator::Descendant => doc
                .ancestors(node)
                .into_iter()
                .any(|ancestor| self.matches_at(doc, ancestor, i - 1)),
        }
    }
}

/// A parsed selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Selector, SelectorError> {
        SelectorParser::parse(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether this is the bare universal selector.
    pub fn is_universal(&self) -> bool {
        self.alternatives.iter().any(|alt| {
            alt.compounds.len() == 1 && alt.compounds[0] == Compound::default()
        })
    }
}

impl Matcher for Selector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(doc, node))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn parse(input: &'a str) -> Result<Selector, SelectorError> {
        let mut parser = Self { input, pos: 0 };
        let mut alternatives = Vec::new();

        loop {
            parser.skip_whitespace();
            alternatives.push(parser.parse_complex()?);
            parser.skip_whitespace();
            match parser.peek() {
                None => break,
                Some(',') => parser.advance(),
                Some(c) => return Err(parser.error(format!("unexpected character {:?}", c))),
            }
        }

        Ok(Selector {
            source: input.to_string(),
            alternatives,
        })
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let spaced = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.advance();
                    self.skip_whitespace();
                    Combinator::Child
                }
                None | Some(',') => break,
                Some(_) if spaced => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected character {:?}", c))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let start = self.pos;
        let mut compound = Compound::default();

        match self.peek() {
            Some('*') => self.advance(),
            Some(c) if is_name_char(c) => compound.tag = Some(self.parse_name()?),
            _ => {}
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.advance();
                    compound.classes.push(self.parse_name()?);
                }
                Some('[') => {
                    self.advance();
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("expected a selector".to_string()));
        }
        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<AttributeTest, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_name()?;
        self.skip_whitespace();

        let value = if self.peek() == Some('=') {
            self.advance();
            self.skip_whitespace();
            let value = match self.peek() {
                Some(quote @ ('"' | '\'')) => self.parse_quoted(quote)?,
                _ => self.parse_name()?,
            };
            self.skip_whitespace();
            Some(value)
        } else {
            None
        };

        self.expect(']')?;
        Ok(AttributeTest { name, value })
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, SelectorError> {
        self.advance();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value = self.input[start..self.pos].to_string();
                self.advance();
                return Ok(value);
            }
            self.advance();
        }
        Err(self.error("unclosed string".to_string()))
    }

    fn parse_name(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected a name".to_string()));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", expected)))
        }
    }

    /// Returns whether any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
        self.pos != start
    }

    fn error(&self, reason: String) -> SelectorError {
        SelectorError::Invalid {
            selector: self.input.to_string(),
            position: self.pos,
            reason,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':')
}

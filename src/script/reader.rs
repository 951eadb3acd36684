//! S-expression reader.
//!
//! Turns one line of script text into a syntax tree of lists, symbols,
//! numeric literals and quoted strings. The reader knows nothing about
//! signals or actions; [`crate::script::parser`] gives the tree meaning.
//!
//! Atom kinds are decided by their first character only, so there is never
//! any backtracking across alternatives:
//!
//! | First char | Atom |
//! |---|---|
//! | `(` | list |
//! | `'` | string literal (no embedded quote) |
//! | digit or `-` | number |
//! | letter | symbol (letters, digits, `.`, `_`, `-`) |

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, eof, map, opt, peek, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult, Parser,
};

use crate::core::error::ScriptError;

/// Syntax tree produced by the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp<'a> {
    Symbol(&'a str),
    /// Unconverted numeric literal text
    Number(&'a str),
    /// String literal without the quotes
    Str(&'a str),
    List(Vec<Sexp<'a>>),
}

impl Sexp<'_> {
    /// Short name of the node kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Sexp::Symbol(_) => "symbol",
            Sexp::Number(_) => "number",
            Sexp::Str(_) => "string",
            Sexp::List(_) => "list",
        }
    }
}

/// Read a complete script into a syntax tree
pub fn read(text: &str, max_depth: usize) -> Result<Sexp<'_>, ScriptError> {
    if text.trim().is_empty() {
        return Err(ScriptError::parsing("Empty expression"));
    }
    check_depth(text, max_depth)?;

    match all_consuming(delimited(multispace0, item, multispace0)).parse(text) {
        Ok((_, sexp)) => Ok(sexp),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = text.len() - e.input.len();
            let near: String = e.input.chars().take(16).collect();
            Err(ScriptError::parsing(if near.is_empty() {
                format!("Unexpected end of expression at position {}", position)
            } else {
                format!("Unexpected input at position {}: '{}'", position, near)
            }))
        }
        Err(nom::Err::Incomplete(_)) => Err(ScriptError::parsing("Incomplete expression")),
    }
}

/// Reject over-deep nesting before the recursive reader sees it
fn check_depth(text: &str, max_depth: usize) -> Result<(), ScriptError> {
    let mut depth = 0usize;
    let mut in_string = false;
    for c in text.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => {
                depth += 1;
                if depth > max_depth {
                    return Err(ScriptError::parsing(format!(
                        "Expression is nested deeper than {} levels",
                        max_depth
                    )));
                }
            }
            ')' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn item(input: &str) -> IResult<&str, Sexp<'_>> {
    terminated(
        alt((list, string, number, symbol)),
        peek(alt((multispace1, tag(")"), eof))),
    )
    .parse(input)
}

fn list(input: &str) -> IResult<&str, Sexp<'_>> {
    map(
        delimited(
            char('('),
            many0(preceded(multispace0, item)),
            preceded(multispace0, char(')')),
        ),
        Sexp::List,
    )
    .parse(input)
}

fn string(input: &str) -> IResult<&str, Sexp<'_>> {
    map(
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        Sexp::Str,
    )
    .parse(input)
}

fn number(input: &str) -> IResult<&str, Sexp<'_>> {
    map(
        recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))),
        Sexp::Number,
    )
    .parse(input)
}

fn symbol(input: &str) -> IResult<&str, Sexp<'_>> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic()),
            take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
        )),
        Sexp::Symbol,
    )
    .parse(input)
}

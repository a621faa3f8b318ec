//! Selector list validation
//!
//! Selectors handed to the engine from outside (forced-invert lists) are
//! checked before being written into a stylesheet, so one malformed entry
//! cannot invalidate a whole generated rule.
//!
//! Grammar accepted:
//!
//! ```text
//! list     := complex ( "," complex )*
//! complex  := compound ( combinator compound )*
//! compound := ( type | "*" )? ( "#id" | ".class" | "[attr]" | ":pseudo" | "::pseudo" )*
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, one_of},
    combinator::{all_consuming, opt, recognize, value},
    error::{context, VerboseError},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    Finish, IResult,
};

use crate::error::SelectorError;

type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

/// CSS identifier, allowing backslash escapes
fn ident(input: &str) -> ParseResult<&str> {
    recognize(many1(alt((
        take_while1(is_ident_char),
        recognize(pair(char('\\'), take_while1(|c: char| c != ' '))),
    ))))(input)
}

/// Balanced parenthesized argument text
fn arguments(input: &str) -> ParseResult<&str> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Ok((&input[i..], &input[..i]));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(VerboseError {
        errors: vec![(
            input,
            nom::error::VerboseErrorKind::Context("unbalanced parentheses"),
        )],
    }))
}

fn quoted(input: &str) -> ParseResult<&str> {
    alt((
        recognize(delimited(char('"'), take_while(|c| c != '"'), char('"'))),
        recognize(delimited(char('\''), take_while(|c| c != '\''), char('\''))),
    ))(input)
}

fn attribute(input: &str) -> ParseResult<&str> {
    context(
        "attribute selector",
        recognize(tuple((
            char('['),
            multispace0,
            ident,
            multispace0,
            opt(tuple((
                alt((
                    tag("~="),
                    tag("|="),
                    tag("^="),
                    tag("$="),
                    tag("*="),
                    tag("="),
                )),
                multispace0,
                alt((quoted, ident)),
                multispace0,
                opt(tuple((one_of("iIsS"), multispace0))),
            ))),
            char(']'),
        ))),
    )(input)
}

fn pseudo(input: &str) -> ParseResult<&str> {
    context(
        "pseudo selector",
        recognize(tuple((
            char(':'),
            opt(char(':')),
            ident,
            opt(tuple((char('('), arguments, char(')')))),
        ))),
    )(input)
}

fn subclass(input: &str) -> ParseResult<&str> {
    alt((
        recognize(preceded(char('#'), ident)),
        recognize(preceded(char('.'), ident)),
        attribute,
        pseudo,
    ))(input)
}

fn compound(input: &str) -> ParseResult<&str> {
    context(
        "compound selector",
        alt((
            recognize(pair(alt((tag("*"), ident)), many0(subclass))),
            recognize(many1(subclass)),
        )),
    )(input)
}

fn combinator(input: &str) -> ParseResult<()> {
    alt((
        value((), tuple((multispace0, one_of(">+~"), multispace0))),
        value((), multispace1),
    ))(input)
}

fn complex(input: &str) -> ParseResult<&str> {
    recognize(pair(compound, many0(pair(combinator, compound))))(input)
}

fn selector_list(input: &str) -> ParseResult<Vec<&str>> {
    separated_list1(
        tuple((multispace0, char(','), multispace0)),
        complex,
    )(input)
}

/// Check that `selector` is a syntactically valid selector list
pub fn validate_selector(selector: &str) -> Result<(), SelectorError> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(SelectorError::Empty);
    }

    all_consuming(selector_list)(trimmed)
        .finish()
        .map(|_| ())
        .map_err(|err| SelectorError::Invalid {
            selector: trimmed.to_string(),
            near: err
                .errors
                .first()
                .map(|(rest, _)| rest.chars().take(20).collect())
                .unwrap_or_default(),
        })
}

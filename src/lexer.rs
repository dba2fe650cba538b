use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use nom::branch::*;
use nom::bytes::complete::*;
use nom::character::complete::*;
use nom::combinator::*;
use nom::sequence::*;

#[macro_use]
mod macros;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub span: Span,
    pub text: Rc<str>,
    pub kind: TokenKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Mnemonic(Mnemonic),
    Integer,
    Colon,
}

mnemonics! {
    pub enum Mnemonic {
        IConst = "iconst",
        IAdd = "iadd",
        Invoke = "invoke",
        Ret = "ret",
    }
}

type Error<'a> = nom::error::VerboseError<&'a str>;
type PResult<'a, T> = nom::IResult<&'a str, T, Error<'a>>;

pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut text = input;
    let mut tokens = Vec::new();

    loop {
        text = text.trim_start();
        if text.is_empty() {
            break;
        } else if text.starts_with("//") {
            text = text.trim_start_matches(|ch| ch != '\n');
        } else {
            match complete(token_kind)(text) {
                Ok((rest, kind)) => {
                    let token_start = input.len() - text.len();
                    let token_end = input.len() - rest.len();
                    tokens.push(Token {
                        span: Span {
                            start: token_start,
                            length: token_end - token_start,
                        },
                        text: input[token_start..token_end].into(),
                        kind,
                    });
                    text = rest;
                }
                Err(e) => match e {
                    nom::Err::Incomplete(_) => unreachable!("using complete parser"),
                    nom::Err::Error(e) | nom::Err::Failure(e) => return Err(e),
                },
            }
        }
    }

    Ok(tokens)
}

fn token_kind(input: &str) -> PResult<TokenKind> {
    alt((
        map(integer, |_| TokenKind::Integer),
        map(word, |text| {
            Mnemonic::lookup(text).map_or(TokenKind::Identifier, TokenKind::Mnemonic)
        }),
        map(char(':'), |_| TokenKind::Colon),
    ))(input)
}

/// Decimal or `0x` prefixed hexadecimal. Trailing letters are kept so that `12ab` is reported
/// as a malformed integer rather than two tokens.
fn integer(input: &str) -> PResult<&str> {
    let hexadecimal = preceded(tag_no_case("0x"), hex_digit1);
    let decimal = preceded(opt(char('-')), digit1);
    recognize(pair(alt((hexadecimal, decimal)), alphanumeric0))(input)
}

fn word(input: &str) -> PResult<&str> {
    recognize(pair(
        take_while1(|ch: char| ch.is_ascii_alphabetic() || ch == '_'),
        take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'),
    ))(input)
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier => Display::fmt("an identifier", f),
            TokenKind::Mnemonic(mnemonic) => Display::fmt(mnemonic, f),
            TokenKind::Integer => Display::fmt("an integer literal", f),
            TokenKind::Colon => Display::fmt("`:`", f),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.text.fmt(f)
    }
}

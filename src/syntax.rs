//! Parser for the textual form of a program.
//!
//! ```text
//! // comments run to the end of the line
//! invoke main 0
//! main:
//!     iconst 10
//!     invoke add_five 1
//!     ret
//! add_five:
//!     iconst 0x5
//!     iadd
//!     ret
//! ```
//!
//! A label names the index of the instruction that follows it. `invoke` accepts either a label
//! or a raw instruction index.

use crate::bytecode::{self, IConst, InstrId, Invoke, Operation, Program};
use crate::lexer::*;

use thiserror::Error;

use nom::error::{ErrorKind as NomErrorKind, ParseError};

use std::collections::HashMap;
use std::convert::TryFrom;
use std::error::Error as StdError;
use std::fmt::{Display, Write};
use std::rc::Rc;

#[derive(Debug, Clone, Error)]
#[error("failed to parse")]
pub struct Error {
    location: SourceLocation,
    #[source]
    kind: ErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("combinator {0:?}")]
    Nom(NomErrorKind),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("failed to parse integer")]
    ParseInteger(#[from] std::num::ParseIntError),
    #[error("{value} does not fit in {ty}")]
    OutOfRange { value: i64, ty: &'static str },

    #[error("unexpected token: {0}")]
    UnexpectedToken(TokenKind),
    #[error("found {found}, expected {expected}", found = display_or(found.as_ref(), "EOF"))]
    ExpectedToken {
        expected: TokenKind,
        found: Option<TokenKind>,
    },
    #[error("found {0}, expected a label or an instruction")]
    ExpectedItem(TokenKind),
    #[error("found {0}, expected a label or an instruction index")]
    ExpectedTarget(TokenKind),

    #[error("label `{0}` is defined more than once")]
    DuplicateLabel(Rc<str>),
    #[error("label `{0}` is never defined")]
    UndefinedLabel(Rc<str>),

    #[error("invalid program")]
    Program(#[from] bytecode::Error),
}

fn display_or<T: Display>(value: Option<T>, default: impl Into<String>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| default.into())
}

/// Byte offset into the source text.
type SourceLocation = Option<usize>;

type Input<'a> = &'a [Token];
type PResult<'a, T> = nom::IResult<Input<'a>, T, Error>;

#[derive(Debug, Clone)]
enum Item {
    Label(Token),
    Instruction(PendingInstruction),
}

/// An instruction whose `invoke` target may still be a label.
#[derive(Debug, Clone)]
struct PendingInstruction {
    mnemonic: Token,
    operation: PendingOperation,
}

#[derive(Debug, Clone)]
enum PendingOperation {
    Resolved(Operation),
    Invoke { target: Target, arguments: u8 },
}

#[derive(Debug, Clone)]
enum Target {
    Index(u32),
    Label(Token),
}

impl Error {
    fn source_location(input: Input) -> SourceLocation {
        input.first().map(|token| token.span.start)
    }

    pub fn single(input: Input, kind: ErrorKind) -> Self {
        Error {
            location: Self::source_location(input),
            kind,
        }
    }

    fn at(token: &Token, kind: ErrorKind) -> Self {
        Error {
            location: Some(token.span.start),
            kind,
        }
    }

    /// Renders the error chain followed by the offending line and a caret under the location.
    pub fn format(&self, source: &str) -> String {
        let mut result = String::new();

        let pos = self.location.unwrap_or_else(|| source.len());
        let line_start = source[..pos]
            .rfind('\n')
            .map(|start| start + 1)
            .unwrap_or(0);
        let line_end = source[pos..]
            .find('\n')
            .map(|end| pos + end)
            .unwrap_or_else(|| source.len());
        let snippet = &source[line_start..line_end];
        let line_offset = pos - line_start;
        let line_number = source[..line_start].matches('\n').count() + 1;

        write!(result, "line {}: ", line_number).unwrap();

        let mut error: &(dyn StdError + 'static) = &self.kind;
        loop {
            write!(result, "{}", error).unwrap();
            match error.source() {
                Some(inner) => {
                    result.push_str(": ");
                    error = inner;
                }
                None => break,
            }
        }

        write!(
            result,
            "\n{}\n{blank:offset$}^",
            snippet,
            blank = "",
            offset = line_offset
        )
        .unwrap();

        result
    }
}

impl<'a> ParseError<Input<'a>> for Error {
    fn from_error_kind(input: Input<'a>, kind: NomErrorKind) -> Self {
        Error::single(input, ErrorKind::Nom(kind))
    }

    fn append(_input: Input<'a>, _kind: NomErrorKind, other: Self) -> Self {
        other
    }
}

pub fn parse(tokens: Input) -> Result<Program, Error> {
    let span = debug_span!("parse", tokens = tokens.len());
    let _guard = span.enter();

    let mut tokens = tokens;

    let mut labels = HashMap::new();
    let mut instructions = Vec::new();

    while !tokens.is_empty() {
        match item(tokens) {
            Ok((rest, item)) => {
                match item {
                    Item::Label(name) => {
                        let index = instructions.len() as u32;
                        if labels.insert(name.text.clone(), index).is_some() {
                            return Err(Error::at(
                                &name,
                                ErrorKind::DuplicateLabel(name.text.clone()),
                            ));
                        }
                        trace!("label `{}` = {}", name, index);
                    }
                    Item::Instruction(instruction) => instructions.push(instruction),
                }
                tokens = rest;
            }
            Err(e) => match e {
                nom::Err::Incomplete(_) => unreachable!("using complete parser"),
                nom::Err::Error(e) | nom::Err::Failure(e) => return Err(e),
            },
        }
    }

    let operations = instructions
        .iter()
        .map(|instruction| {
            let offset = instruction.mnemonic.span.start;
            instruction
                .resolve(&labels)
                .map(|operation| (offset, operation))
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "{} instructions, {} labels",
        operations.len(),
        labels.len()
    );

    Program::new(operations).map_err(|e| {
        let index = match e {
            bytecode::Error::MissingBootstrap => 0,
            bytecode::Error::TargetOutOfRange { index, .. }
            | bytecode::Error::TargetIsBootstrap { index } => index as usize,
        };
        Error {
            location: instructions
                .get(index)
                .map(|instruction| instruction.mnemonic.span.start),
            kind: ErrorKind::Program(e),
        }
    })
}

impl PendingInstruction {
    fn resolve(&self, labels: &HashMap<Rc<str>, u32>) -> Result<Operation, Error> {
        match &self.operation {
            PendingOperation::Resolved(operation) => Ok(*operation),
            PendingOperation::Invoke { target, arguments } => {
                let target = match target {
                    Target::Index(index) => *index,
                    Target::Label(name) => *labels.get(&name.text).ok_or_else(|| {
                        Error::at(name, ErrorKind::UndefinedLabel(name.text.clone()))
                    })?,
                };
                Ok(Operation::Invoke(Invoke {
                    target: InstrId(target),
                    arguments: *arguments,
                }))
            }
        }
    }
}

fn item(input: Input) -> PResult<Item> {
    let (_, next) = token(input)?;
    match next.kind {
        TokenKind::Identifier => label(input),
        TokenKind::Mnemonic(mnemonic) => instruction(mnemonic, input),
        found => Err(nom::Err::Failure(Error::single(
            input,
            ErrorKind::ExpectedItem(found),
        ))),
    }
}

fn label(input: Input) -> PResult<Item> {
    let (input, name) = token_kind(TokenKind::Identifier)(input)?;
    let (input, _) = failure(token_kind(TokenKind::Colon))(input)?;
    Ok((input, Item::Label(name)))
}

fn instruction(mnemonic: Mnemonic, input: Input) -> PResult<Item> {
    let (input, token) = token_kind(TokenKind::Mnemonic(mnemonic))(input)?;

    let (input, operation) = match mnemonic {
        Mnemonic::IConst => {
            let (input, value) = failure(constant)(input)?;
            let operation = Operation::IConst(IConst(value));
            (input, PendingOperation::Resolved(operation))
        }
        Mnemonic::IAdd => (input, PendingOperation::Resolved(Operation::IAdd)),
        Mnemonic::Invoke => {
            let (input, target) = failure(target)(input)?;
            let (input, arguments) = failure(integer::<u8>)(input)?;
            (input, PendingOperation::Invoke { target, arguments })
        }
        Mnemonic::Ret => (input, PendingOperation::Resolved(Operation::Ret)),
    };

    let instruction = PendingInstruction {
        mnemonic: token,
        operation,
    };
    Ok((input, Item::Instruction(instruction)))
}

fn target(input: Input) -> PResult<Target> {
    let (rest, next) = token(input)?;
    match next.kind {
        TokenKind::Integer => {
            let (rest, index) = integer::<u32>(input)?;
            Ok((rest, Target::Index(index)))
        }
        TokenKind::Identifier => Ok((rest, Target::Label(next))),
        found => Err(nom::Err::Error(Error::single(
            input,
            ErrorKind::ExpectedTarget(found),
        ))),
    }
}

/// A 32-bit constant: any signed decimal that fits, or a hexadecimal bit pattern.
fn constant(input: Input) -> PResult<i32> {
    let (rest, value) = integer::<i64>(input)?;
    let value = i32::try_from(value)
        .or_else(|_| u32::try_from(value).map(|bits| bits as i32))
        .map_err(|_| {
            nom::Err::Failure(Error::single(
                input,
                ErrorKind::OutOfRange { value, ty: "32 bits" },
            ))
        })?;
    Ok((rest, value))
}

fn integer<'a, T>(input: Input<'a>) -> PResult<'a, T>
where
    T: TryFrom<i64>,
{
    let (rest, token) = integer_literal(input)?;
    let fail = |kind| nom::Err::Failure(Error::single(input, kind));

    let value = parse_integer(&token.text).map_err(fail)?;
    let value = T::try_from(value).map_err(|_| {
        fail(ErrorKind::OutOfRange {
            value,
            ty: std::any::type_name::<T>(),
        })
    })?;

    Ok((rest, value))
}

fn parse_integer(text: &str) -> Result<i64, ErrorKind> {
    let hexadecimal = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"));

    match hexadecimal {
        Some(digits) => Ok(i64::from(u32::from_str_radix(digits, 16)?)),
        None => Ok(text.parse()?),
    }
}

fn integer_literal(input: Input) -> PResult<Token> {
    token_kind(TokenKind::Integer)(input)
}

fn token_kind<'a>(kind: TokenKind) -> impl Fn(Input<'a>) -> PResult<Token> {
    map_err(
        move |err| {
            let found = match err {
                ErrorKind::UnexpectedToken(found) => Some(found),
                _ => None,
            };

            ErrorKind::ExpectedToken {
                found,
                expected: kind,
            }
        },
        token_where(move |token| token.kind == kind),
    )
}

fn token_where(f: impl Fn(&Token) -> bool) -> impl Fn(Input) -> PResult<Token> {
    move |input| {
        let (rest, token) = token(input)?;

        if f(&token) {
            Ok((rest, token))
        } else {
            Err(nom::Err::Error(Error::single(
                input,
                ErrorKind::UnexpectedToken(token.kind),
            )))
        }
    }
}

fn token(input: Input) -> PResult<Token> {
    let mut tokens = input.iter();
    let token = tokens
        .next()
        .ok_or_else(|| nom::Err::Error(Error::single(input, ErrorKind::UnexpectedEof)))?;
    Ok((tokens.as_slice(), token.clone()))
}

/// Once an item has been recognized, any error in its remainder is final.
fn failure<'a, T>(
    parser: impl Fn(Input<'a>) -> PResult<'a, T>,
) -> impl Fn(Input<'a>) -> PResult<'a, T> {
    move |input| {
        parser(input).map_err(|e| match e {
            nom::Err::Error(e) => nom::Err::Failure(e),
            e => e,
        })
    }
}

fn map_err<'a, T>(
    f: impl Fn(ErrorKind) -> ErrorKind,
    parser: impl Fn(Input<'a>) -> PResult<'a, T>,
) -> impl Fn(Input<'a>) -> PResult<'a, T> {
    move |input| {
        parser(input).map_err(|e| {
            e.map(|e| Error {
                kind: f(e.kind),
                ..e
            })
        })
    }
}

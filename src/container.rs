//! Decoding of the binary container holding a stack machine program.
//!
//! ```text
//! [magic:4][count:u32 LE][record]*count
//!
//! record: [0x01][value:i32 LE]              ICONST
//!         [0x02]                            IADD
//!         [0x03][target:u32 LE][argc:u8]    INVOKE
//!         [0x04]                            RET
//! ```

use std::convert::TryFrom;

use nom::bytes::complete::take;
use nom::combinator::map;
use nom::error::ErrorKind as NomErrorKind;
use nom::number::complete::{le_i32, le_u32, le_u8};
use nom::sequence::{pair, tuple};
use thiserror::Error;

use crate::bytecode::{self, IConst, InstrId, Invoke, Opcode, Operation, Program};

/// Accepted magic numbers: the same four characters read in either byte order.
pub const MAGIC: [&[u8; 4]; 2] = [b"STAK", b"KATS"];

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("container is {len} bytes long, too short for the {} byte header", HEADER_LEN)]
    Header { len: usize },
    #[error("bad magic {found}, expected `STAK` or `KATS`", found = escape(found))]
    Magic { found: [u8; 4] },
    #[error("instruction {index} at byte {offset} is truncated")]
    Truncated { index: u32, offset: usize },
    #[error("unknown opcode {tag:#04x} for instruction {index} at byte {offset}")]
    UnknownOpcode { tag: u8, index: u32, offset: usize },
    #[error("invalid program")]
    Program(#[from] bytecode::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type Input<'a> = &'a [u8];
type PResult<'a, T> = nom::IResult<Input<'a>, T, (Input<'a>, NomErrorKind)>;

pub fn decode(bytes: &[u8]) -> Result<Program> {
    let span = debug_span!("decode", bytes = bytes.len());
    let _guard = span.enter();

    let (mut input, (magic, count)) =
        header(bytes).map_err(|_| Error::Header { len: bytes.len() })?;

    if !MAGIC.iter().any(|accepted| &accepted[..] == magic) {
        let mut found = [0; 4];
        found.copy_from_slice(magic);
        return Err(Error::Magic { found });
    }

    debug!("{} instructions in {} container", count, escape(magic));

    let mut operations = Vec::with_capacity((count as usize).min(input.len()));

    for index in 0..count {
        let offset = bytes.len() - input.len();
        let truncated = |_| Error::Truncated { index, offset };

        let (rest, tag) = opcode_tag(input).map_err(truncated)?;
        let opcode = Opcode::try_from(tag).map_err(|_| Error::UnknownOpcode {
            tag,
            index,
            offset,
        })?;
        let (rest, operation) = operands(opcode, rest).map_err(truncated)?;

        operations.push((offset, operation));
        input = rest;
    }

    if !input.is_empty() {
        debug!("ignoring {} trailing bytes", input.len());
    }

    let program = Program::new(operations)?;
    Ok(program)
}

fn header(input: Input) -> PResult<(Input, u32)> {
    tuple((take(4usize), le_u32))(input)
}

fn opcode_tag(input: Input) -> PResult<u8> {
    le_u8(input)
}

fn operands(opcode: Opcode, input: Input) -> PResult<Operation> {
    match opcode {
        Opcode::IConst => map(le_i32, |value| Operation::IConst(IConst(value)))(input),
        Opcode::IAdd => Ok((input, Operation::IAdd)),
        Opcode::Invoke => map(pair(le_u32, le_u8), |(target, arguments)| {
            Operation::Invoke(Invoke {
                target: InstrId(target),
                arguments,
            })
        })(input),
        Opcode::Ret => Ok((input, Operation::Ret)),
    }
}

fn escape(bytes: &[u8]) -> String {
    let text = bytes
        .iter()
        .flat_map(|&byte| std::ascii::escape_default(byte))
        .map(char::from)
        .collect::<String>();
    format!("`{}`", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::build::*;

    fn unhex(text: &str) -> Vec<u8> {
        let digits = text.chars().filter(|ch| !ch.is_whitespace()).collect::<Vec<_>>();
        digits
            .chunks(2)
            .map(|pair| {
                let pair = pair.iter().collect::<String>();
                u8::from_str_radix(&pair, 16).unwrap()
            })
            .collect()
    }

    fn operations(program: &Program) -> Vec<Operation> {
        program
            .instructions()
            .iter()
            .map(|instruction| instruction.operation)
            .collect()
    }

    #[test]
    fn single_function() {
        let bytes = unhex("4B415453 03000000  030100000000 01FF000000 04");
        let program = decode(&bytes).unwrap();

        assert_eq!(
            operations(&program),
            vec![invoke(1, 0), iconst(255), Operation::Ret]
        );
        let offsets = program
            .instructions()
            .iter()
            .map(|instruction| instruction.offset)
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![8, 14, 19]);
        assert_eq!(program.entry(), InstrId(1));
    }

    #[test]
    fn bytes_past_the_declared_count_are_ignored() {
        let bytes = unhex(
            "4B415453 06000000
             030100000000
             010A000000
             030400000001
             04
             0105000000
             02
             04",
        );
        let program = decode(&bytes).unwrap();

        assert_eq!(
            operations(&program),
            vec![
                invoke(1, 0),
                iconst(10),
                invoke(4, 1),
                Operation::Ret,
                iconst(5),
                Operation::IAdd,
            ]
        );
        assert!(program.is_function_entry(InstrId(4)));
    }

    #[test]
    fn both_magic_orders_are_accepted() {
        let bytes = unhex("5354414B 02000000 030100000000 04");
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn negative_constants() {
        let bytes = unhex("5354414B 02000000 030100000000 01FEFFFFFF");
        let program = decode(&bytes).unwrap();
        assert_eq!(program.instructions()[1].operation, iconst(-2));
    }

    #[test]
    fn bad_magic_is_rejected_before_instructions() {
        // the declared count would also be truncated
        let bytes = unhex("4B415455 05000000");
        let err = decode(&bytes).unwrap_err();

        assert_eq!(err, Error::Magic { found: *b"KATU" });
        assert!(err.to_string().contains("`KATU`"));
    }

    #[test]
    fn short_header() {
        let err = decode(b"KATS\x01").unwrap_err();
        assert_eq!(err, Error::Header { len: 5 });
    }

    #[test]
    fn truncated_between_records() {
        let bytes = unhex("4B415453 03000000 030100000000 04");
        let err = decode(&bytes).unwrap_err();

        assert_eq!(
            err,
            Error::Truncated {
                index: 2,
                offset: 15
            }
        );
    }

    #[test]
    fn truncated_inside_a_record() {
        let bytes = unhex("4B415453 02000000 030100000000 01FF00");
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, Error::Truncated { index: 1, offset: 14 });

        let bytes = unhex("4B415453 01000000 0301000000");
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, Error::Truncated { index: 0, offset: 8 });
    }

    #[test]
    fn unknown_opcode() {
        let bytes = unhex("4B415453 02000000 030100000000 07");
        let err = decode(&bytes).unwrap_err();

        assert_eq!(
            err,
            Error::UnknownOpcode {
                tag: 0x07,
                index: 1,
                offset: 14
            }
        );
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn structural_program_errors() {
        let bytes = unhex("4B415453 01000000 0105000000");
        assert_eq!(
            decode(&bytes).unwrap_err(),
            Error::Program(bytecode::Error::MissingBootstrap)
        );

        let bytes = unhex("4B415453 00000000");
        assert_eq!(
            decode(&bytes).unwrap_err(),
            Error::Program(bytecode::Error::MissingBootstrap)
        );

        let bytes = unhex("4B415453 02000000 030700000000 04");
        assert!(matches!(
            decode(&bytes).unwrap_err(),
            Error::Program(bytecode::Error::TargetOutOfRange { target: 7, .. })
        ));
    }
}

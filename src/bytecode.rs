use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// A validated stack machine program.
///
/// Instruction 0 is always an `INVOKE` naming the entry function. It is consumed by the
/// bootstrap sequence rather than being translated itself.
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// Every instruction that is the target of some `INVOKE`.
    entries: BTreeSet<InstrId>,
    bootstrap: Invoke,
}

/// Position of an instruction in its program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub id: InstrId,
    /// Byte offset in the source the instruction was decoded from.
    pub offset: usize,
    pub operation: Operation,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    IConst(IConst),
    IAdd,
    Invoke(Invoke),
    Ret,
}

/// Push a constant to the stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IConst(pub i32);

/// Call the function starting at `target`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub target: InstrId,
    pub arguments: u8,
}

/// Tags identifying each operation in the binary container.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    IConst = 0x01,
    IAdd = 0x02,
    Invoke = 0x03,
    Ret = 0x04,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("instruction 0 must be `invoke <entry> <argc>` to bootstrap the program")]
    MissingBootstrap,
    #[error("instruction {index} invokes {target}, but the program only has {count} instructions")]
    TargetOutOfRange { index: u32, target: u32, count: usize },
    #[error("instruction {index} invokes the bootstrap marker at index 0")]
    TargetIsBootstrap { index: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Program {
    /// Builds a program from operations and the byte offsets they were read from.
    ///
    /// Every `INVOKE` target must name an instruction after the bootstrap marker.
    pub fn new(operations: impl IntoIterator<Item = (usize, Operation)>) -> Result<Program> {
        let instructions = operations
            .into_iter()
            .enumerate()
            .map(|(index, (offset, operation))| Instruction {
                id: InstrId(index as u32),
                offset,
                operation,
            })
            .collect::<Vec<_>>();

        let bootstrap = match instructions.first().map(|first| first.operation) {
            Some(Operation::Invoke(invoke)) => invoke,
            _ => return Err(Error::MissingBootstrap),
        };

        let count = instructions.len();
        let mut entries = BTreeSet::new();

        for instruction in &instructions {
            if let Operation::Invoke(invoke) = instruction.operation {
                let target = invoke.target.0;
                if target as usize >= count {
                    return Err(Error::TargetOutOfRange {
                        index: instruction.id.0,
                        target,
                        count,
                    });
                }
                if target == 0 {
                    return Err(Error::TargetIsBootstrap {
                        index: instruction.id.0,
                    });
                }
                entries.insert(invoke.target);
            }
        }

        Ok(Program {
            instructions,
            entries,
            bootstrap,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// First instruction of the entry function.
    pub fn entry(&self) -> InstrId {
        self.bootstrap.target
    }

    pub fn entry_arguments(&self) -> u8 {
        self.bootstrap.arguments
    }

    pub fn is_function_entry(&self, id: InstrId) -> bool {
        self.entries.contains(&id)
    }

    pub fn function_entries(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.entries.iter().copied()
    }
}

impl InstrId {
    pub const BOOTSTRAP: InstrId = InstrId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Operation {
    pub fn opcode(&self) -> Opcode {
        match self {
            Operation::IConst(_) => Opcode::IConst,
            Operation::IAdd => Opcode::IAdd,
            Operation::Invoke(_) => Opcode::Invoke,
            Operation::Ret => Opcode::Ret,
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::IConst => "ICONST",
            Opcode::IAdd => "IADD",
            Opcode::Invoke => "INVOKE",
            Opcode::Ret => "RET",
        };
        f.write_str(name)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operation::IConst(IConst(value)) => write!(f, "{} {}", self.opcode(), value),
            Operation::Invoke(invoke) => write!(
                f,
                "{} {} {}",
                self.opcode(),
                invoke.target.0,
                invoke.arguments
            ),
            Operation::IAdd | Operation::Ret => self.opcode().fmt(f),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.id.0, self.operation)
    }
}

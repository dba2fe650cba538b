//! Translation of stack machine programs into MIPS machine words.
//!
//! Translation happens in two passes over the same [`Program`]: [`measure`] assigns every
//! instruction its absolute address, then [`emit`] produces the code using those addresses
//! to encode calls. Every instruction has a fixed size, so a single measure pass is enough
//! even for forward calls.

mod emit;
mod measure;

use crate::bytecode::{IConst, Instruction, Operation, Program};
use crate::mips::{self, Word};

use thiserror::Error;

pub use self::measure::AddressMap;

/// Stack pointer setup, entry call with its delay slot, and the exit syscall.
pub const BOOTSTRAP_WORDS: u32 = 6;

/// Saves `$ra` and `$fp` and sets up the frame pointer.
pub const PROLOGUE_WORDS: u32 = 5;

/// Where code is placed and where the stack starts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Layout {
    pub text_base: u32,
    pub stack_top: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{name} {address:#010x} is not aligned to a 4 byte word")]
    Unaligned { name: &'static str, address: u32 },
}

/// The output of a translation.
#[derive(Debug, Clone)]
pub struct Image {
    pub words: Vec<Word>,
    pub addresses: AddressMap,
}

/// An instruction to translate, and whether a function prologue precedes it.
#[derive(Debug, Copy, Clone)]
struct Step<'a> {
    instruction: &'a Instruction,
    prologue: bool,
}

impl Layout {
    pub const TEXT_BASE: u32 = 0x0040_0000;
    pub const STACK_TOP: u32 = 0x7FFF_EFFC;

    /// Both addresses must be word aligned: `jal` drops the low two bits of its target, and
    /// the stack is accessed a word at a time.
    pub fn new(text_base: u32, stack_top: u32) -> Result<Layout, Error> {
        for &(name, address) in &[("text base", text_base), ("stack top", stack_top)] {
            if address % 4 != 0 {
                return Err(Error::Unaligned { name, address });
            }
        }

        Ok(Layout {
            text_base,
            stack_top,
        })
    }

    /// Absolute address of the word at `offset` from the start of the text segment.
    pub fn address_of(&self, offset: u32) -> u32 {
        self.text_base.wrapping_add(offset.wrapping_mul(4))
    }
}

impl Default for Layout {
    fn default() -> Layout {
        Layout {
            text_base: Layout::TEXT_BASE,
            stack_top: Layout::STACK_TOP,
        }
    }
}

pub fn translate(program: &Program, layout: &Layout) -> Image {
    let span = info_span!("translate", instructions = program.len());
    let _guard = span.enter();

    debug!(
        "entry {} takes {} arguments, {} functions",
        program.entry().0,
        program.entry_arguments(),
        program.function_entries().count()
    );

    let addresses = measure::resolve(program, layout);
    trace!("{:?}", addresses);
    let words = emit::emit(program, &addresses, layout);

    debug_assert_eq!(
        words.len(),
        addresses.total_words() as usize,
        "emitted code disagrees with measured size"
    );

    info!("translated into {} words", words.len());

    Image { words, addresses }
}

/// The instructions that produce code, in emission order.
///
/// Both passes walk the program through this iterator so they agree on ordering and on
/// where prologues go.
fn steps<'a>(program: &'a Program) -> impl Iterator<Item = Step<'a>> + 'a {
    program
        .instructions()
        .iter()
        .skip(1)
        .map(move |instruction| Step {
            instruction,
            prologue: program.is_function_entry(instruction.id),
        })
}

/// Number of words the code for a single operation occupies, excluding any prologue.
fn operation_words(operation: &Operation) -> u32 {
    match operation {
        Operation::IConst(IConst(value)) => load_immediate_words(*value) + PUSH_WORDS,
        Operation::IAdd => 2 * POP_WORDS + 1 + PUSH_WORDS,
        Operation::Invoke(_) => 2,
        Operation::Ret => POP_WORDS + 2 + PUSH_WORDS + 2,
    }
}

const PUSH_WORDS: u32 = 2;
const POP_WORDS: u32 = 2;

fn load_immediate_words(value: i32) -> u32 {
    if mips::fits_i16(value) {
        1
    } else {
        2
    }
}

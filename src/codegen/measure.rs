use std::fmt::{self, Debug};

use super::{operation_words, steps, Layout, BOOTSTRAP_WORDS, PROLOGUE_WORDS};
use crate::bytecode::{InstrId, Program};

/// Absolute address of every instruction in a program, indexed by [`InstrId`].
#[derive(Clone, PartialEq, Eq)]
pub struct AddressMap {
    addresses: Vec<u32>,
    total_words: u32,
}

impl AddressMap {
    /// Address of the instruction's own code, after any prologue.
    ///
    /// Panics if the instruction is not part of the measured program.
    pub fn address(&self, id: InstrId) -> u32 {
        self.addresses[id.index()]
    }

    /// Size of the complete image, bootstrap included.
    pub fn total_words(&self) -> u32 {
        self.total_words
    }
}

/// Assigns every instruction the address it will be emitted at.
pub(super) fn resolve(program: &Program, layout: &Layout) -> AddressMap {
    let span = debug_span!("measure");
    let _guard = span.enter();

    let mut addresses = vec![0; program.len()];
    let mut words = BOOTSTRAP_WORDS;

    // The bootstrap marker emits nothing; it sits where the first function begins.
    addresses[InstrId::BOOTSTRAP.index()] = layout.address_of(words);

    for step in steps(program) {
        if step.prologue {
            words += PROLOGUE_WORDS;
        }

        let address = layout.address_of(words);
        addresses[step.instruction.id.index()] = address;

        if step.prologue {
            debug!("function {} at {:#010x}", step.instruction.id.0, address);
        }

        words += operation_words(&step.instruction.operation);
    }

    debug!("measured {} words", words);

    AddressMap {
        addresses,
        total_words: words,
    }
}

impl Debug for AddressMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Hex(u32);

        impl Debug for Hex {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        f.debug_struct("AddressMap")
            .field(
                "addresses",
                &self.addresses.iter().map(|&a| Hex(a)).collect::<Vec<_>>(),
            )
            .field("total_words", &self.total_words)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::build::*;
    use crate::bytecode::Operation;

    #[test]
    fn prologue_is_counted_before_the_entry_address() {
        let program = program(&[invoke(1, 0), iconst(255), Operation::Ret]);
        let layout = Layout::default();
        let map = resolve(&program, &layout);

        assert_eq!(map.address(InstrId(0)), layout.address_of(6));
        assert_eq!(map.address(InstrId(1)), layout.address_of(11));
        assert_eq!(map.address(InstrId(2)), layout.address_of(14));
        assert_eq!(map.total_words(), 22);
    }

    #[test]
    fn forward_and_backward_calls() {
        let program = program(&[
            invoke(3, 0),
            iconst(1),
            Operation::Ret,
            invoke(1, 0),
            invoke(1, 0),
            Operation::Ret,
        ]);
        let map = resolve(&program, &Layout::default());

        // 6 bootstrap, 5 prologue, 3 + 8 for the callee, 5 prologue for the caller.
        assert_eq!(map.address(InstrId(1)), Layout::TEXT_BASE + 11 * 4);
        assert_eq!(map.address(InstrId(3)), Layout::TEXT_BASE + 27 * 4);
        assert_eq!(map.address(InstrId(4)), Layout::TEXT_BASE + 29 * 4);
        assert_eq!(map.total_words(), 39);
    }
}

use super::{steps, AddressMap, Layout};
use crate::bytecode::{IConst, Invoke, Operation, Program};
use crate::mips::{self, encode_i, encode_j, encode_r, funct, op, Register, Word};

/// Accumulates the code of a single translation.
struct Emitter<'a> {
    words: Vec<Word>,
    addresses: &'a AddressMap,
}

/// Produces the code for `program`, calling functions at the addresses in `addresses`.
pub(super) fn emit(program: &Program, addresses: &AddressMap, layout: &Layout) -> Vec<Word> {
    let span = debug_span!("emit");
    let _guard = span.enter();

    let mut emitter = Emitter {
        words: Vec::with_capacity(addresses.total_words() as usize),
        addresses,
    };

    emitter.bootstrap(program, layout);

    for step in steps(program) {
        if step.prologue {
            emitter.prologue();
        }

        trace!("{}", step.instruction);

        match step.instruction.operation {
            Operation::IConst(IConst(value)) => emitter.iconst(value),
            Operation::IAdd => emitter.iadd(),
            Operation::Invoke(invoke) => emitter.invoke(invoke),
            Operation::Ret => emitter.ret(),
        }
    }

    emitter.words
}

impl<'a> Emitter<'a> {
    fn push(&mut self, word: Word) {
        self.words.push(word);
    }

    fn bootstrap(&mut self, program: &Program, layout: &Layout) {
        let (high, low) = mips::split_halves(layout.stack_top);
        self.push(encode_i(op::LUI, Register::ZERO, Register::SP, high));
        self.push(encode_i(op::ORI, Register::SP, Register::SP, low));

        self.call(self.addresses.address(program.entry()));

        // exit
        self.push(encode_i(op::ADDIU, Register::ZERO, Register::V0, 10));
        self.push(mips::SYSCALL);
    }

    fn prologue(&mut self) {
        self.push_register(Register::RA);
        self.push_register(Register::FP);
        self.copy(Register::FP, Register::SP);
    }

    fn iconst(&mut self, value: i32) {
        self.load_immediate(Register::T0, value);
        self.push_register(Register::T0);
    }

    fn iadd(&mut self) {
        self.pop_register(Register::T1);
        self.pop_register(Register::T0);
        self.push(encode_r(
            Register::T0,
            Register::T1,
            Register::T0,
            0,
            funct::ADDU,
        ));
        self.push_register(Register::T0);
    }

    fn invoke(&mut self, invoke: Invoke) {
        self.call(self.addresses.address(invoke.target));
    }

    fn ret(&mut self) {
        self.pop_register(Register::T1);
        // `$fp` points at the saved frame pointer, with the return address above it. Load
        // `$ra` first, while `$fp` still addresses this frame.
        self.push(encode_i(op::LW, Register::FP, Register::RA, 4));
        self.push(encode_i(op::LW, Register::FP, Register::FP, 0));
        self.push_register(Register::T1);
        self.push(encode_r(
            Register::RA,
            Register::ZERO,
            Register::ZERO,
            0,
            funct::JR,
        ));
        self.nop();
    }

    /// `jal` followed by its delay slot.
    fn call(&mut self, address: u32) {
        self.push(encode_j(op::JAL, mips::jump_target(address)));
        self.nop();
    }

    fn load_immediate(&mut self, target: Register, value: i32) {
        if mips::fits_i16(value) {
            self.push(encode_i(op::ADDIU, Register::ZERO, target, value as u16));
        } else {
            let (high, low) = mips::split_halves(value as u32);
            self.push(encode_i(op::LUI, Register::ZERO, target, high));
            self.push(encode_i(op::ORI, target, target, low));
        }
    }

    fn push_register(&mut self, source: Register) {
        self.push(encode_i(op::ADDIU, Register::SP, Register::SP, -4i16 as u16));
        self.push(encode_i(op::SW, Register::SP, source, 0));
    }

    fn pop_register(&mut self, target: Register) {
        self.push(encode_i(op::LW, Register::SP, target, 0));
        self.push(encode_i(op::ADDIU, Register::SP, Register::SP, 4));
    }

    fn copy(&mut self, target: Register, source: Register) {
        self.push(encode_r(source, Register::ZERO, target, 0, funct::ADDU));
    }

    fn nop(&mut self) {
        self.push(encode_r(
            Register::ZERO,
            Register::ZERO,
            Register::ZERO,
            0,
            funct::SLL,
        ));
    }
}

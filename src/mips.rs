//! Bit packing for the three MIPS instruction formats.
//!
//! Every encoder masks its fields to their declared width and never fails, so out-of-range
//! operands are truncated exactly like the hardware would.

/// A single machine word of the target.
pub type Word = u32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register(pub u8);

impl Register {
    pub const ZERO: Register = Register(0);
    pub const V0: Register = Register(2);
    pub const T0: Register = Register(8);
    pub const T1: Register = Register(9);
    pub const SP: Register = Register(29);
    pub const FP: Register = Register(30);
    pub const RA: Register = Register(31);

    fn field(self) -> Word {
        Word::from(self.0)
    }
}

/// Primary opcodes (bits 31..26).
pub mod op {
    pub const SPECIAL: u8 = 0x00;
    pub const JAL: u8 = 0x03;
    pub const ADDIU: u8 = 0x09;
    pub const ORI: u8 = 0x0D;
    pub const LUI: u8 = 0x0F;
    pub const LW: u8 = 0x23;
    pub const SW: u8 = 0x2B;
}

/// Function codes of `SPECIAL` instructions (bits 5..0).
pub mod funct {
    pub const SLL: u8 = 0x00;
    pub const JR: u8 = 0x08;
    pub const ADDU: u8 = 0x21;
}

pub const SYSCALL: Word = 0x0000_000C;

const OPCODE_SHIFT: u32 = 26;
const RS_SHIFT: u32 = 21;
const RT_SHIFT: u32 = 16;
const RD_SHIFT: u32 = 11;
const SHAMT_SHIFT: u32 = 6;

const OPCODE_MASK: Word = 0x3F;
const REGISTER_MASK: Word = 0x1F;
const SHAMT_MASK: Word = 0x1F;
const FUNCT_MASK: Word = 0x3F;
const IMMEDIATE_MASK: Word = 0xFFFF;
const TARGET_MASK: Word = 0x03FF_FFFF;

/// `[0:6][rs:5][rt:5][rd:5][shamt:5][funct:6]`
pub fn encode_r(rs: Register, rt: Register, rd: Register, shamt: u8, funct: u8) -> Word {
    ((Word::from(op::SPECIAL) & OPCODE_MASK) << OPCODE_SHIFT)
        | ((rs.field() & REGISTER_MASK) << RS_SHIFT)
        | ((rt.field() & REGISTER_MASK) << RT_SHIFT)
        | ((rd.field() & REGISTER_MASK) << RD_SHIFT)
        | ((Word::from(shamt) & SHAMT_MASK) << SHAMT_SHIFT)
        | (Word::from(funct) & FUNCT_MASK)
}

/// `[opcode:6][rs:5][rt:5][immediate:16]`
///
/// The immediate is stored as raw bits; sign or zero extension is decided by the opcode.
pub fn encode_i(opcode: u8, rs: Register, rt: Register, immediate: u16) -> Word {
    ((Word::from(opcode) & OPCODE_MASK) << OPCODE_SHIFT)
        | ((rs.field() & REGISTER_MASK) << RS_SHIFT)
        | ((rt.field() & REGISTER_MASK) << RT_SHIFT)
        | (Word::from(immediate) & IMMEDIATE_MASK)
}

/// `[opcode:6][target:26]`
///
/// `target` is a word index, so byte addresses must be shifted right by two first.
pub fn encode_j(opcode: u8, target: u32) -> Word {
    ((Word::from(opcode) & OPCODE_MASK) << OPCODE_SHIFT) | (target & TARGET_MASK)
}

/// The `jal` target field for an absolute byte address.
pub fn jump_target(address: u32) -> u32 {
    (address >> 2) & TARGET_MASK
}

/// Whether `value` survives a round trip through a sign-extended 16-bit immediate.
pub fn fits_i16(value: i32) -> bool {
    i32::from(value as i16) == value
}

/// Upper and lower halves of a 32-bit value, as loaded by a `lui`/`ori` pair.
pub fn split_halves(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, value as u16)
}


#[cfg(test)]
mod tests {
    use super::fields;
    use super::*;

    #[test]
    fn r_format_fields() {
        let word = encode_r(Register(17), Register(5), Register(30), 19, 0x2A);

        assert_eq!(fields::opcode(word), 0);
        assert_eq!(fields::rs(word), 17);
        assert_eq!(fields::rt(word), 5);
        assert_eq!(fields::rd(word), 30);
        assert_eq!(fields::shamt(word), 19);
        assert_eq!(fields::funct(word), 0x2A);
    }

    #[test]
    fn r_format_truncates_wide_fields() {
        let word = encode_r(Register(0xFF), Register(33), Register(34), 0xE5, 0xFF);

        assert_eq!(fields::rs(word), 0x1F);
        assert_eq!(fields::rt(word), 1);
        assert_eq!(fields::rd(word), 2);
        assert_eq!(fields::shamt(word), 0x05);
        assert_eq!(fields::funct(word), 0x3F);
        assert_eq!(fields::opcode(word), 0);
    }

    #[test]
    fn i_format_fields() {
        for &(opcode, rs, rt, immediate) in &[
            (op::ADDIU, 29, 29, 0xFFFC),
            (op::LW, 30, 31, 4),
            (0xFF, 0x3F, 0x20, 0xABCD),
        ] {
            let word = encode_i(opcode, Register(rs), Register(rt), immediate);
            assert_eq!(fields::opcode(word), opcode & 0x3F);
            assert_eq!(fields::rs(word), rs & 0x1F);
            assert_eq!(fields::rt(word), rt & 0x1F);
            assert_eq!(fields::immediate(word), immediate);
        }
    }

    #[test]
    fn j_format_masks_target() {
        let word = encode_j(op::JAL, 0xFFFF_FFFF);
        assert_eq!(fields::opcode(word), op::JAL);
        assert_eq!(fields::target(word), 0x03FF_FFFF);

        let word = encode_j(op::JAL, jump_target(0x0040_002C));
        assert_eq!(word, 0x0C10_000B);
    }

    #[test]
    fn known_encodings() {
        // lui $sp, 0x7fff
        assert_eq!(
            encode_i(op::LUI, Register::ZERO, Register::SP, 0x7FFF),
            0x3C1D_7FFF
        );
        // ori $sp, $sp, 0xeffc
        assert_eq!(
            encode_i(op::ORI, Register::SP, Register::SP, 0xEFFC),
            0x37BD_EFFC
        );
        // addiu $sp, $sp, -4
        assert_eq!(
            encode_i(op::ADDIU, Register::SP, Register::SP, -4i16 as u16),
            0x27BD_FFFC
        );
        // sw $ra, 0($sp)
        assert_eq!(
            encode_i(op::SW, Register::SP, Register::RA, 0),
            0xAFBF_0000
        );
        // addu $fp, $sp, $zero
        assert_eq!(
            encode_r(Register::SP, Register::ZERO, Register::FP, 0, funct::ADDU),
            0x03A0_F021
        );
        // jr $ra
        assert_eq!(
            encode_r(Register::RA, Register::ZERO, Register::ZERO, 0, funct::JR),
            0x03E0_0008
        );
        // sll $zero, $zero, 0
        assert_eq!(
            encode_r(Register::ZERO, Register::ZERO, Register::ZERO, 0, funct::SLL),
            0
        );
    }

    #[test]
    fn sixteen_bit_boundaries() {
        assert!(fits_i16(-32768));
        assert!(fits_i16(32767));
        assert!(fits_i16(0));
        assert!(!fits_i16(32768));
        assert!(!fits_i16(-32769));
        assert!(!fits_i16(i32::MIN));
    }

    #[test]
    fn halves() {
        assert_eq!(split_halves(0x7FFF_EFFC), (0x7FFF, 0xEFFC));
        assert_eq!(split_halves(-1i32 as u32), (0xFFFF, 0xFFFF));
    }
}

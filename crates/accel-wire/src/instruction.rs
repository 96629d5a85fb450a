use crate::INSTRUCTION_SIZE;

// Instruction word 2 packing: tag[31:0], tag-type[33:32], group[43:34].
const TAG_TYPE_SHIFT: u32 = 32;
const TAG_TYPE_MASK: u64 = 0x3;
const GRP_SHIFT: u32 = 34;
const GRP_MASK: u64 = 0x3ff;

// Instruction word 0: done-interrupt flag at bit 16; the rest is reserved.
const DONEINT_BIT: u64 = 1 << 16;

/// One fixed-size hardware work request.
///
/// Eight little-endian 64-bit words:
/// - word 0: done-interrupt flag (bit 16)
/// - word 1: result-word device address (16-byte aligned)
/// - word 2: scheduler tag / tag type / group
/// - word 3: optional work-queue pointer (zero when unused)
/// - words 4..7: engine operand words `ei0..ei3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub doneint: bool,
    pub res_addr: u64,
    pub tag: u32,
    pub tag_type: u8,
    pub grp: u16,
    pub wq_ptr: u64,
    pub ei0: u64,
    pub ei1: u64,
    pub ei2: u64,
    pub ei3: u64,
}

impl Instruction {
    pub fn encode(&self) -> [u8; INSTRUCTION_SIZE] {
        let word0 = if self.doneint { DONEINT_BIT } else { 0 };
        let word2 = u64::from(self.tag)
            | (u64::from(self.tag_type) & TAG_TYPE_MASK) << TAG_TYPE_SHIFT
            | (u64::from(self.grp) & GRP_MASK) << GRP_SHIFT;

        let words = [
            word0,
            self.res_addr,
            word2,
            self.wq_ptr,
            self.ei0,
            self.ei1,
            self.ei2,
            self.ei3,
        ];
        let mut out = [0u8; INSTRUCTION_SIZE];
        for (i, word) in words.iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Device-side decode, used by mock engines and tests.
    pub fn decode(bytes: &[u8; INSTRUCTION_SIZE]) -> Instruction {
        let word = |i: usize| u64::from_le_bytes(bytes[i * 8..(i + 1) * 8].try_into().unwrap());
        let word2 = word(2);
        Instruction {
            doneint: word(0) & DONEINT_BIT != 0,
            res_addr: word(1),
            tag: word2 as u32,
            tag_type: ((word2 >> TAG_TYPE_SHIFT) & TAG_TYPE_MASK) as u8,
            grp: ((word2 >> GRP_SHIFT) & GRP_MASK) as u16,
            wq_ptr: word(3),
            ei0: word(4),
            ei1: word(5),
            ei2: word(6),
            ei3: word(7),
        }
    }
}

/// The engine command word (`ei0`): opcode, two parameters, and the input
/// directive length, each 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCommand {
    pub opcode: u16,
    pub param1: u16,
    pub param2: u16,
    pub dlen: u16,
}

impl EngineCommand {
    /// Pack into the on-wire operand word. Each field is stored big-endian
    /// and the whole 64-bit unit is then byte-swapped for the microcode's
    /// big-endian data reads.
    pub fn to_word(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&self.opcode.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.param1.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.param2.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.dlen.to_be_bytes());
        u64::from_le_bytes(bytes).swap_bytes()
    }

    pub fn from_word(word: u64) -> EngineCommand {
        let bytes = word.swap_bytes().to_le_bytes();
        EngineCommand {
            opcode: u16::from_be_bytes(bytes[0..2].try_into().unwrap()),
            param1: u16::from_be_bytes(bytes[2..4].try_into().unwrap()),
            param2: u16::from_be_bytes(bytes[4..6].try_into().unwrap()),
            dlen: u16::from_be_bytes(bytes[6..8].try_into().unwrap()),
        }
    }
}

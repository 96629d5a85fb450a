//! Bit-exact wire formats at the accelerator boundary.
//!
//! Everything the device reads or writes is specified here: the 64-byte
//! instruction record, the engine command word, the result/status word, and
//! the scatter/gather directive. All layouts are expressed through explicit
//! byte packing (`to_le_bytes`/`to_be_bytes` + `copy_from_slice`); nothing
//! relies on struct layout or host endianness.
//!
//! Instructions are stored little-endian. The engine command word and the
//! scatter/gather payload are the exception: the microcode reads its data
//! big-endian, so lengths/addresses inside the directive are big-endian and
//! the command word and directive header are byte-swapped as whole 64-bit
//! units.

mod instruction;
mod result;
mod sg;

pub use instruction::{EngineCommand, Instruction};
pub use result::{CompletionCode, ResultWord};
pub use sg::{build_directive, parse_directive, SgFragment};

/// Size of one instruction record, in bytes.
pub const INSTRUCTION_SIZE: usize = 64;

/// Size of one instruction record, in 64-bit words. The queue doorbell is
/// counted in words, so it advances by multiples of this per instruction.
pub const INSTRUCTION_WORDS: u32 = 8;

/// Trailing next-chunk pointer at the end of every command-queue chunk.
pub const NEXT_CHUNK_PTR_SIZE: usize = 8;

/// Size of the device-written result/status word.
pub const RESULT_WORD_SIZE: usize = 16;

/// Directive header: scatter count, gather count, reserved.
pub const SG_HEADER_SIZE: usize = 8;

/// One directive block: 4 big-endian u16 lengths + 4 big-endian u64 addresses.
pub const SG_BLOCK_SIZE: usize = 40;

/// Fragments packed per directive block.
pub const SG_PER_BLOCK: usize = 4;

/// Initial value of the first result-blob word (the "alternate completion
/// word"). The engine overwrites it when it starts producing output, so the
/// scanner can tell "engine never started" from "output in flight".
pub const RESULT_BLOB_INIT: u64 = !0u64;

/// Directive blocks needed to cover `fragments` fragments.
pub const fn sg_blocks(fragments: usize) -> usize {
    (fragments + SG_PER_BLOCK - 1) / SG_PER_BLOCK
}

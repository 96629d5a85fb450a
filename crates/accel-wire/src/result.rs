use crate::RESULT_WORD_SIZE;

const DONEINT_BIT: u64 = 1 << 16;

/// Completion code in the low byte of the result word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    /// Initial sentinel: the device has not written a result yet.
    NotDone,
    Success,
    /// DMA or transport fault reported by the device.
    Fault,
    /// Microcode-reported software error.
    SoftwareError,
    /// Any value outside the defined set.
    Unknown(u8),
}

impl CompletionCode {
    pub fn from_raw(raw: u8) -> CompletionCode {
        match raw {
            0 => CompletionCode::NotDone,
            1 => CompletionCode::Success,
            2 => CompletionCode::Fault,
            3 => CompletionCode::SoftwareError,
            other => CompletionCode::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            CompletionCode::NotDone => 0,
            CompletionCode::Success => 1,
            CompletionCode::Fault => 2,
            CompletionCode::SoftwareError => 3,
            CompletionCode::Unknown(raw) => raw,
        }
    }
}

/// The device-written result/status word: two 64-bit words, of which only
/// word 0 carries state (completion code in the low byte, done-interrupt
/// echo at bit 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultWord {
    pub code: CompletionCode,
    pub doneint: bool,
}

impl ResultWord {
    pub fn encode(&self) -> [u8; RESULT_WORD_SIZE] {
        let mut word0 = u64::from(self.code.to_raw());
        if self.doneint {
            word0 |= DONEINT_BIT;
        }
        let mut out = [0u8; RESULT_WORD_SIZE];
        out[0..8].copy_from_slice(&word0.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; RESULT_WORD_SIZE]) -> ResultWord {
        let word0 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        ResultWord {
            code: CompletionCode::from_raw(word0 as u8),
            doneint: word0 & DONEINT_BIT != 0,
        }
    }
}

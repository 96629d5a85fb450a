use std::sync::Arc;

use accel_dma::{DmaError, DmaMapping, DmaMemory, DmaRegion};
use accel_wire::{
    build_directive, CompletionCode, ResultWord, SgFragment, RESULT_BLOB_INIT, RESULT_WORD_SIZE,
};

use crate::config::EngineConfig;
use crate::error::{Result, SubmitError};

/// Result blob size: one 64-bit word the microcode overwrites when it starts
/// producing output (the "alternate completion word").
const RESULT_BLOB_SIZE: usize = 8;

/// One client buffer fragment, addressed in device (DMA) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub addr: u64,
    pub len: u16,
}

/// All DMA state for one request: fragment mappings, the packed directive
/// the device gathers from, the result blob, and the completion word.
///
/// Owned by the request's pending entry from submission until release;
/// dropping it unmaps and frees everything exactly once. The device writes
/// the result blob and completion word while the set is in flight; the host
/// side only reads them (from the completion scanner).
pub(crate) struct DescriptorSet {
    // Held only so their Drop unmaps the client buffers with the rest of
    // the set.
    _gather_maps: Vec<DmaMapping>,
    _scatter_maps: Vec<DmaMapping>,
    directive: DmaRegion,
    result: DmaRegion,
    completion: DmaRegion,
    directive_len: u16,
}

impl DescriptorSet {
    /// Map every fragment, build the directive, and seed the result blob and
    /// completion word. Any failure unwinds whatever was already mapped or
    /// allocated (ownership does the rollback).
    pub(crate) fn prepare(
        dma: &Arc<DmaMemory>,
        config: &EngineConfig,
        input: &[Fragment],
        output: &[Fragment],
    ) -> Result<DescriptorSet> {
        let count = input.len() + output.len();
        if count == 0 {
            return Err(SubmitError::InvalidState("request has no fragments"));
        }
        if count > config.max_sg_fragments {
            return Err(SubmitError::TooManyFragments {
                count,
                max: config.max_sg_fragments,
            });
        }

        let gather_maps = map_fragments(dma, input)?;
        let scatter_maps = map_fragments(dma, output)?;

        let gather: Vec<SgFragment> = fragments_for_device(input);
        let scatter: Vec<SgFragment> = fragments_for_device(output);
        let bytes = build_directive(&gather, &scatter);
        let directive_len = u16::try_from(bytes.len())
            .map_err(|_| SubmitError::InvalidState("directive exceeds 64KiB"))?;

        let directive = dma
            .alloc_coherent(bytes.len(), 8)
            .map_err(SubmitError::PrepareFailed)?;
        directive.write(0, &bytes).map_err(SubmitError::PrepareFailed)?;

        let result = dma
            .alloc_coherent(RESULT_BLOB_SIZE, 8)
            .map_err(SubmitError::PrepareFailed)?;
        result
            .write_u64(0, RESULT_BLOB_INIT)
            .map_err(SubmitError::PrepareFailed)?;

        // The completion word must be 16-byte aligned for the result-address
        // instruction field.
        let completion = dma
            .alloc_coherent(RESULT_WORD_SIZE, 16)
            .map_err(SubmitError::PrepareFailed)?;
        let init = ResultWord {
            code: CompletionCode::NotDone,
            doneint: false,
        };
        completion
            .write(0, &init.encode())
            .map_err(SubmitError::PrepareFailed)?;

        Ok(DescriptorSet {
            _gather_maps: gather_maps,
            _scatter_maps: scatter_maps,
            directive,
            result,
            completion,
            directive_len,
        })
    }

    /// Device address of the packed directive (instruction operand `ei1`).
    pub(crate) fn dptr(&self) -> u64 {
        self.directive.device_addr()
    }

    /// Device address of the result blob (instruction operand `ei2`).
    pub(crate) fn rptr(&self) -> u64 {
        self.result.device_addr()
    }

    /// Device address of the completion word (instruction result address).
    pub(crate) fn completion_addr(&self) -> u64 {
        self.completion.device_addr()
    }

    pub(crate) fn directive_len(&self) -> u16 {
        self.directive_len
    }

    pub(crate) fn completion_code(&self) -> std::result::Result<CompletionCode, DmaError> {
        let mut byte = [0u8; 1];
        self.completion.read(0, &mut byte)?;
        Ok(CompletionCode::from_raw(byte[0]))
    }

    /// True while the result blob still carries its init sentinel, i.e. the
    /// engine has not started writing output for this request.
    pub(crate) fn result_blob_untouched(&self) -> std::result::Result<bool, DmaError> {
        Ok(self.result.read_u64(0)? == RESULT_BLOB_INIT)
    }

    #[cfg(test)]
    pub(crate) fn mapping_count(&self) -> usize {
        self._gather_maps.len() + self._scatter_maps.len() + 3
    }
}

fn map_fragments(dma: &Arc<DmaMemory>, list: &[Fragment]) -> Result<Vec<DmaMapping>> {
    let mut maps = Vec::with_capacity(list.len());
    for frag in list {
        // On failure the partial `maps` vector drops, unmapping everything
        // mapped so far.
        let mapping = dma
            .map_region(frag.addr, usize::from(frag.len))
            .map_err(SubmitError::DmaMapFailed)?;
        maps.push(mapping);
    }
    Ok(maps)
}

fn fragments_for_device(list: &[Fragment]) -> Vec<SgFragment> {
    list.iter()
        .map(|frag| SgFragment {
            addr: frag.addr,
            len: frag.len,
        })
        .collect()
}

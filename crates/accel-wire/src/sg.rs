use crate::{sg_blocks, SG_BLOCK_SIZE, SG_HEADER_SIZE, SG_PER_BLOCK};

/// One scatter/gather fragment as the device sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgFragment {
    pub addr: u64,
    pub len: u16,
}

/// Build the input-directive bytes: an 8-byte header followed by the gather
/// (input) blocks, then the scatter (output) blocks.
///
/// Header layout before swapping: scatter count (u16), gather count (u16),
/// 4 reserved bytes. The whole 8-byte unit is byte-swapped, matching the
/// microcode's big-endian view of the directive.
pub fn build_directive(gather: &[SgFragment], scatter: &[SgFragment]) -> Vec<u8> {
    let g_bytes = sg_blocks(gather.len()) * SG_BLOCK_SIZE;
    let s_bytes = sg_blocks(scatter.len()) * SG_BLOCK_SIZE;
    let mut out = vec![0u8; SG_HEADER_SIZE + g_bytes + s_bytes];

    let mut header = [0u8; SG_HEADER_SIZE];
    header[0..2].copy_from_slice(&(scatter.len() as u16).to_le_bytes());
    header[2..4].copy_from_slice(&(gather.len() as u16).to_le_bytes());
    header.reverse();
    out[0..SG_HEADER_SIZE].copy_from_slice(&header);

    pack_blocks(gather, &mut out[SG_HEADER_SIZE..SG_HEADER_SIZE + g_bytes]);
    pack_blocks(scatter, &mut out[SG_HEADER_SIZE + g_bytes..]);
    out
}

fn pack_blocks(list: &[SgFragment], out: &mut [u8]) {
    for (i, frag) in list.iter().enumerate() {
        let block = i / SG_PER_BLOCK * SG_BLOCK_SIZE;
        let slot = i % SG_PER_BLOCK;
        let len_off = block + slot * 2;
        let addr_off = block + SG_PER_BLOCK * 2 + slot * 8;
        out[len_off..len_off + 2].copy_from_slice(&frag.len.to_be_bytes());
        out[addr_off..addr_off + 8].copy_from_slice(&frag.addr.to_be_bytes());
    }
}

/// Device-side decode of a directive, used by mock engines and tests.
/// Returns `(gather, scatter)` fragment lists, zero-slot padding removed.
pub fn parse_directive(bytes: &[u8]) -> Option<(Vec<SgFragment>, Vec<SgFragment>)> {
    if bytes.len() < SG_HEADER_SIZE {
        return None;
    }
    let mut header = [0u8; SG_HEADER_SIZE];
    header.copy_from_slice(&bytes[0..SG_HEADER_SIZE]);
    header.reverse();
    let scatter_cnt = u16::from_le_bytes(header[0..2].try_into().unwrap()) as usize;
    let gather_cnt = u16::from_le_bytes(header[2..4].try_into().unwrap()) as usize;

    let g_bytes = sg_blocks(gather_cnt) * SG_BLOCK_SIZE;
    let s_bytes = sg_blocks(scatter_cnt) * SG_BLOCK_SIZE;
    if bytes.len() < SG_HEADER_SIZE + g_bytes + s_bytes {
        return None;
    }

    let gather = unpack_blocks(&bytes[SG_HEADER_SIZE..SG_HEADER_SIZE + g_bytes], gather_cnt);
    let scatter = unpack_blocks(
        &bytes[SG_HEADER_SIZE + g_bytes..SG_HEADER_SIZE + g_bytes + s_bytes],
        scatter_cnt,
    );
    Some((gather, scatter))
}

fn unpack_blocks(bytes: &[u8], count: usize) -> Vec<SgFragment> {
    (0..count)
        .map(|i| {
            let block = i / SG_PER_BLOCK * SG_BLOCK_SIZE;
            let slot = i % SG_PER_BLOCK;
            let len_off = block + slot * 2;
            let addr_off = block + SG_PER_BLOCK * 2 + slot * 8;
            SgFragment {
                len: u16::from_be_bytes(bytes[len_off..len_off + 2].try_into().unwrap()),
                addr: u64::from_be_bytes(bytes[addr_off..addr_off + 8].try_into().unwrap()),
            }
        })
        .collect()
}

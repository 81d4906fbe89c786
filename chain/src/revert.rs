//! Revert records (spec.md §4.4.3): the ordered list of UTXO entries a
//! block consumed, persisted so disconnecting it never needs to re-run
//! validation over history.

use thunderbolt_core::codec::{decode_utxo_entry, encode_utxo_entry, Reader, Writer};
use thunderbolt_core::model::UtxoEntry;
use thunderbolt_core::CodecResult;

/// Not a consensus constant; a generous ceiling on how many consumed
/// entries one block's revert record can list, bounded by what
/// `MAX_BLOCK_SIZE` could possibly reference at one input per byte.
const MAX_CONSUMED: usize = thunderbolt_core::params::MAX_BLOCK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevertRecord {
    pub consumed: Vec<UtxoEntry>,
}

pub fn encode_revert_record(w: &mut Writer, record: &RevertRecord) {
    w.write_vec(&record.consumed, |w, entry| encode_utxo_entry(w, entry));
}

pub fn decode_revert_record(r: &mut Reader) -> CodecResult<RevertRecord> {
    Ok(RevertRecord { consumed: r.read_vec(MAX_CONSUMED, decode_utxo_entry)? })
}

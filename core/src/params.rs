//! Consensus constants shared by every layer of the node.
//!
//! These are the numeric knobs spec.md pins down exactly; nothing here is
//! network-configurable, unlike [`crate::config::Config`].

/// Smallest currency unit per whole coin.
pub const COIN: u64 = 100_000_000;

/// Maximum representable supply, in smallest units.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Maximum serialized block size.
pub const MAX_BLOCK_SIZE: usize = 5 * 1024 * 1024;

/// Maximum wire message payload size.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Blocks a coinbase output must wait before it is spendable.
pub const COINBASE_MATURITY: u64 = 100;

/// Block reward halving interval, in blocks.
pub const SUBSIDY_HALVING_INTERVAL: u64 = 210_000;

/// Genesis block subsidy, in smallest units.
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// Difficulty retarget interval, in blocks.
pub const RETARGET_INTERVAL: u64 = 5040;

/// Target average time between blocks, in seconds.
pub const TARGET_SPACING: u64 = 120;

/// Target time for one retarget interval, in seconds (`RETARGET_INTERVAL * TARGET_SPACING`).
pub const TARGET_TIMESPAN: u64 = RETARGET_INTERVAL * TARGET_SPACING;

/// Loosest allowed proof-of-work target (lowest difficulty) a *retarget*
/// may produce: `2^224 - 1`, i.e. the top 4 bytes zero and the remaining 28
/// bytes set. Block `bits` themselves (e.g. the genesis fixture) are not
/// required to stay under this floor — see [`crate::pow::bits_to_target`].
pub const POW_LIMIT: [u8; 32] = {
    let mut limit = [0xffu8; 32];
    limit[0] = 0x00;
    limit[1] = 0x00;
    limit[2] = 0x00;
    limit[3] = 0x00;
    limit
};

/// Returns the block subsidy for `height`, per spec.md §4.4.2.
///
/// Halves every [`SUBSIDY_HALVING_INTERVAL`] blocks; zero once 64 halvings
/// have elapsed (the subsidy would underflow the unit resolution before
/// that, but the explicit cutoff keeps the computation a single shift).
pub fn subsidy(height: u64) -> u64 {
    let halvings = height / SUBSIDY_HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_halves_on_schedule() {
        assert_eq!(subsidy(0), INITIAL_SUBSIDY);
        assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL - 1), INITIAL_SUBSIDY);
        assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL), INITIAL_SUBSIDY / 2);
        assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL * 2), INITIAL_SUBSIDY / 4);
    }

    #[test]
    fn subsidy_reaches_zero() {
        assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL * 64), 0);
        assert_eq!(subsidy(SUBSIDY_HALVING_INTERVAL * 1000), 0);
    }
}

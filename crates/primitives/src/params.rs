//! Protocol-level constants.

/// Height of the L2 genesis batch.
pub const L2_GENESIS_HEIGHT: u64 = 0;

/// Sequencer order number of the L2 genesis batch. The canonical chain is
/// dense starting from this value.
pub const L2_GENESIS_SEQ_NO: u64 = 0;

/// Intrinsic gas of a plain transfer, the lower bound for gas estimation.
pub const TX_GAS: u64 = 21_000;

/// Gas charged per non-zero calldata byte when pricing L1 publication.
pub const CALLDATA_NON_ZERO_GAS: u64 = 16;

/// Gas charged per zero calldata byte when pricing L1 publication.
pub const CALLDATA_ZERO_GAS: u64 = 4;

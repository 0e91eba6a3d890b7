//! Trait abstractions over the enclave's collaborators. Each has one
//! production implementation outside this crate and one in-memory test
//! implementation in [crate::test_utils].

mod storage;
pub use storage::Storage;

mod evm;
pub use evm::{BatchEnv, BlockSpec, CallOutcome, CallRequest, Evm, EvmBatchResult, TxExecution, VmFailure};

mod mempool;
pub use mempool::Mempool;

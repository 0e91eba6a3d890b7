//! The building blocks of the enclave core: L1 ingestion, cross-chain
//! processing, batch execution, the batch registry and signature checks.

mod block_consumer;
pub use block_consumer::{BlockConsumer, BlockIngestionType};

mod cross_chain;
pub use cross_chain::{outbound_leaves, outbound_messages, outbound_transfers, CrossChainProcessors};

mod batch_executor;
pub(crate) use batch_executor::list_hash;
pub use batch_executor::{BatchExecutor, ComputedBatch};

mod registry;
pub use registry::{BatchRegistry, ExecutedBatchRecord};

mod sig_validator;
pub use sig_validator::SignatureValidator;

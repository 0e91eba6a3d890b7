//! The two node roles an enclave can run as: the singleton sequencer that
//! produces batches and rollups, and the validator that re-executes and
//! verifies them.

mod validator;
pub use validator::Validator;

mod sequencer;
pub use sequencer::{Compressor, Sequencer};

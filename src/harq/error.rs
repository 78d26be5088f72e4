use thiserror::Error;

use super::PeerId;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum HarqError {
    #[error("peer {peer}: no idle sender process")]
    NoCapacity { peer: PeerId },
    #[error("sender process {process_id} is already transmitting")]
    CapacityExceeded { process_id: usize },
    #[error("process id {process_id:?} is not one of the {count} processes")]
    InvalidProcess {
        process_id: Option<usize>,
        count: usize,
    },
    #[error("redundancy version {rv} out of range (numRVs = {num_rvs})")]
    InvalidRv { rv: usize, num_rvs: usize },
    #[error("process {process_id}: block {received} would be combined with buffered block {buffered}")]
    MixedTransportBlocks {
        process_id: usize,
        buffered: u64,
        received: u64,
    },
    #[error("sender process {process_id} has no block in flight")]
    ProcessIdle { process_id: usize },
    #[error("process {process_id}: feedback for block {got}, but block {expected} is in flight")]
    StaleFeedback {
        process_id: usize,
        expected: u64,
        got: u64,
    },
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("unknown decoder `{0}`")]
    UnknownDecoder(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

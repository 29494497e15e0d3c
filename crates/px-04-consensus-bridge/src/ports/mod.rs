pub mod outbound;

pub use outbound::{CommitHandler, ConsensusPort};

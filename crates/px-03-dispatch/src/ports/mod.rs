pub mod outbound;

pub use outbound::{ChainRequest, ChainSubmitter, SecurityPort, SignatureCheck};

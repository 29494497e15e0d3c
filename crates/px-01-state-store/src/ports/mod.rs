pub mod store;

pub use store::{StateStore, Trx, TrxExt, TrxMode};

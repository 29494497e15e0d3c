pub mod local_ordering;

pub use local_ordering::LocalOrderingService;

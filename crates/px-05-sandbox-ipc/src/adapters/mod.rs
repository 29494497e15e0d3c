pub mod channel;
pub mod frame_sink;
pub mod writer;

pub use channel::IpcChannel;
pub use frame_sink::FrameSink;
pub use writer::FrameWriter;

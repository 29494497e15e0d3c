pub mod channel_sink;

pub use channel_sink::ChannelSink;

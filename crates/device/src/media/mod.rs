//! Producer/consumer contracts for capture and render: sources, encoder
//! and decoder wrappers, and hardware sinks. Real codec/hardware backends
//! are out of scope; [`testdouble`] supplies synthetic stand-ins used by
//! tests and the example binary.

pub mod decoder;
pub mod encoder;
pub mod render_sink;
pub mod source;
pub mod testdouble;

pub use decoder::{AudioDecoder, AudioProbe, FramebufferProvider, VideoDecoder, VideoProbe};
pub use encoder::{AudioEncoder, VideoEncoder};
pub use render_sink::{AudioRender, VideoRender};
pub use source::{AudioSource, VideoSource};

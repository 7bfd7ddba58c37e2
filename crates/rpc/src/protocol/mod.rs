//! Wire layer: frames on the byte stream and CBOR envelopes inside them.

pub mod codec;
pub mod framing;

pub use codec::IncomingRequest;
pub use framing::{Frame, FrameCodec, FrameType, MAX_FRAME_SIZE};

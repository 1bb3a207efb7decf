//! Wire protocol: value codec, frame extraction, packet model.

pub mod frame;
pub mod packet;
pub mod value;

pub use frame::{build_frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
pub use packet::{error_value, Direction, Packet, Request};
pub use value::Value;

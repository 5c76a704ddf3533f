pub mod beacon;
pub mod frame;
pub mod session;

pub use frame::{parse_tnc2, FrameFormat, InboundFrame};
pub use session::{AprsIsSession, OutCategory, OutboundBatch, SessionSettings};

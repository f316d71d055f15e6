pub mod display;
pub mod reading;

pub use display::{DisplayState, Joint, LinkStatus};
pub use reading::{DecodeError, Reading, JOINT_COUNT};

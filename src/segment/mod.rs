//! Voice-activity segmentation: frame types, pre-roll padding, and the
//! hysteresis state machine.

pub mod frame;
pub mod ring;
pub mod segmenter;

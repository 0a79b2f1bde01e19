//! Room playback: state machine and timer integration

mod machine;

pub use machine::{CutMusicPayload, Playback, STALE_SRC_SECONDS};

// Services module
// Model lifecycle, audio processing, synthesis and artifact storage

pub mod audio;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod tts;

// Audio handling: decoding, reference normalization and output post-processing

pub mod ffmpeg;
pub mod format;
pub mod normalizer;
pub mod postprocess;
pub mod processing;

pub use normalizer::MediaNormalizer;
pub use postprocess::AudioPostProcessor;

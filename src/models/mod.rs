// Domain models module
// Contains core data structures used throughout the application

pub mod job;

pub use job::{
    Artifact, ArtifactReference, AudioInfo, JobStatus, PipelineJob, PipelineStage, SpeechFormat,
    UploadRequest,
};

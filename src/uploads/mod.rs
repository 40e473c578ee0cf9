pub mod files;
pub mod pipeline;

pub use pipeline::{MediaPipeline, UploadItem, UploadRequest};

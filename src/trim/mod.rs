pub mod trimmer;

pub use trimmer::{SourceInfo, TrimOutcome, TrimRequest, Trimmer};

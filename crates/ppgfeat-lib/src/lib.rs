pub mod assemble;
pub mod augment;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod filter;
pub mod io;
pub mod label;
pub mod quality;
pub mod signal;
pub mod source;
pub mod window;

pub use assemble::{Assembler, AssemblyReport};
pub use config::{read_config, PipelineConfig};
pub use dataset::{Dataset, LabeledSample};
pub use error::{PipelineError, PipelineResult};
pub use features::{FeatureExtractor, FeatureSchema, FeatureVector};
pub use filter::Conditioner;
pub use quality::QualityGate;
pub use signal::*;
pub use source::{DirectorySource, Limited, MemorySource, RecordingSource};
pub use window::{Window, WindowPlan};

// Pipeline Hub Library
// Record storage, handlers, and sample data around the execution engine

pub mod error;
pub mod handlers;
pub mod records;
pub mod seed;
pub mod store;
pub mod work;

// Re-export commonly used types
pub use error::{HubError, HubResult};
pub use handlers::{ModelHandler, PipelineHandler, Prediction};
pub use records::{
    CreateModel, CreatePipeline, ModelRecord, ModelUpdate, PipelineRecord, PipelineUpdate,
};
pub use seed::seed_sample_data;
pub use store::HubStore;
pub use work::{mock_predictions, ModelUnit};

pub mod model_handler;
pub mod pipeline_handler;

pub use model_handler::{ModelHandler, Prediction};
pub use pipeline_handler::PipelineHandler;

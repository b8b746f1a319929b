mod controller;
mod picker;
mod prediction;
mod routes;
mod server;
mod state;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
pub use controller::{ControllerError, UploadController, UploadStream};
pub use picker::{DataUri, ImagePicker, PickerError};
pub use prediction::{HttpPredictionClient, PredictionClient, PredictionError};
pub use state::{Phase, ViewSnapshot, ViewState};

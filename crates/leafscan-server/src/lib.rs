//! LeafScan Server
//!
//! HTTP front end for the inference pipeline: accepts an uploaded leaf photo
//! and answers with the predicted disease, its cause and a treatment.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

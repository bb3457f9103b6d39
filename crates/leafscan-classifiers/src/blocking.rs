//! Offloading CPU-bound work from the async runtime

use leafscan_core::{Error, Result};

/// Run `f` on tokio's blocking pool.
///
/// Image decoding, resizing, model compilation and inference all run here so
/// they never stall the worker threads serving other requests. A panic inside
/// `f` surfaces as `Error::Classifier`.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::classifier(format!("blocking task failed: {}", e)))?
}

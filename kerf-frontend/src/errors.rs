use kerf_engine::errors::MeasureError;
use kerf_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Measure(#[from] MeasureError),
}

use std::path::Path;

use kerf_config::MeasurementConfig;
use kerf_core::document::Document;
use kerf_engine::measure::MeasureOptions;
use kerf_io::{DocumentLoader, JsonFacade};
use tracing::info;

use crate::errors::FrontendError;

/// 从磁盘加载已解码的图元图。
pub fn load_document(path: &Path) -> Result<Document, FrontendError> {
    let loader = JsonFacade::new();
    let document = loader.load(path)?;
    info!(
        path = %path.display(),
        entities = document.entities().count(),
        blocks = document.blocks().count(),
        "图元图加载成功"
    );
    Ok(document)
}

pub fn measure_options(config: &MeasurementConfig) -> MeasureOptions {
    MeasureOptions {
        spline_tolerance: config.spline_tolerance,
        max_insert_depth: config.max_insert_depth,
    }
}

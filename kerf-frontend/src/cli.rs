use std::path::Path;

use kerf_config::MeasurementConfig;
use kerf_engine::measure::measure_with;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{load_document, measure_options};
use crate::report::Report;

/// 加载并测量单个图元图文件。被跳过的图元只记录日志，不影响结果。
pub fn measure_file(path: &Path, config: &MeasurementConfig) -> Result<Report, FrontendError> {
    let document = load_document(path)?;
    let report = measure_with(&document, &measure_options(config))?;

    if !report.skipped.is_empty() {
        warn!(
            path = %path.display(),
            skipped = report.skipped.len(),
            "部分图元未参与测量"
        );
    }
    info!(
        total_length = report.result.total_length,
        outer_area = report.result.outer_area,
        measured = report.measured_entities,
        contours = report.closed_contours,
        "测量完成"
    );
    Ok(Report::from_result(&report.result, config.decimals))
}

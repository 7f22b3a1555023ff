use kerf_engine::measure::MeasurementResult;
use serde::Serialize;
use serde_json::json;

use crate::errors::FrontendError;

const MAX_DECIMALS: u32 = 12;

/// 对外输出的测量结果，数值已按配置的小数位取整。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Report {
    pub total_length_mm: f64,
    pub outer_area_mm2: f64,
}

impl Report {
    pub fn from_result(result: &MeasurementResult, decimals: u32) -> Self {
        Self {
            total_length_mm: round_to(result.total_length, decimals),
            outer_area_mm2: round_to(result.outer_area, decimals),
        }
    }
}

/// 失败时的输出，不包含任何部分结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(error: &FrontendError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(MAX_DECIMALS) as i32);
    (value * factor).round() / factor
}

/// 把测量结果或错误渲染为 JSON 文本。
pub fn render(outcome: &Result<Report, FrontendError>) -> String {
    let rendered = match outcome {
        Ok(report) => serde_json::to_string(report),
        Err(err) => serde_json::to_string(&ErrorPayload::new(err)),
    };
    rendered.unwrap_or_else(|err| json!({ "error": err.to_string() }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerf_io::IoError;
    use serde_json::Value;

    #[test]
    fn results_are_rounded_to_configured_decimals() {
        let result = MeasurementResult {
            total_length: 62.831_853,
            outer_area: 15.707_963,
        };
        let report = Report::from_result(&result, 2);
        assert_eq!(report.total_length_mm, 62.83);
        assert_eq!(report.outer_area_mm2, 15.71);
        assert_eq!(round_to(1.23456, 0), 1.0);
        assert_eq!(round_to(1.23456, 3), 1.235);
    }

    #[test]
    fn render_uses_response_field_names() {
        let report = Report {
            total_length_mm: 40.0,
            outer_area_mm2: 100.0,
        };
        let value: Value = serde_json::from_str(&render(&Ok(report))).unwrap();
        assert_eq!(value["total_length_mm"], 40.0);
        assert_eq!(value["outer_area_mm2"], 100.0);
    }

    #[test]
    fn failures_render_as_error_payload_without_results() {
        let outcome = Err(FrontendError::Io(IoError::InvalidDocument(
            "expected value at line 1 column 1".to_string(),
        )));
        let value: Value = serde_json::from_str(&render(&outcome)).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(
            object["error"]
                .as_str()
                .unwrap()
                .starts_with("invalid document structure")
        );
    }
}

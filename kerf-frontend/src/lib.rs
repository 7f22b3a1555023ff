pub mod cli;
pub mod errors;
pub mod loader;
pub mod report;

use std::path::Path;

use errors::FrontendError;
use kerf_config::MeasurementConfig;
use tracing::{error, info};

/// 测量文件并把 JSON 结果（或错误载荷）写到标准输出。
pub fn run_cli(path: &Path, config: &MeasurementConfig) -> Result<(), FrontendError> {
    info!(path = %path.display(), "启动测量 CLI");
    let outcome = cli::measure_file(path, config);
    println!("{}", report::render(&outcome));
    outcome.map(|_| ()).inspect_err(|err| {
        error!(path = %path.display(), error = %err, "测量失败");
    })
}

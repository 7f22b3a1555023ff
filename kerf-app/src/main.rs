use std::path::{Path, PathBuf};

use kerf_config::{AppConfig, ConfigError};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "用法：kerf [--config PATH] <图元图文件>";

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut input: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(2);
                };
                config_override = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return;
            }
            other if other.starts_with('-') => {
                eprintln!("未知参数：{other}\n{USAGE}");
                std::process::exit(2);
            }
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    eprintln!("只能指定一个输入文件\n{USAGE}");
                    std::process::exit(2);
                }
            }
        }
    }

    let Some(input) = input else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let (config, config_error) = load_configuration(config_override.as_deref());
    init_logging(&config);
    if let Some(err) = config_error {
        report_config_error(&err);
    }
    info!(input = %input.display(), "启动 kerf 测量");

    if kerf_frontend::run_cli(&input, &config.measurement).is_err() {
        std::process::exit(1);
    }
}

/// 加载失败时回退到默认配置，错误留待日志初始化后再输出。
fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

/// 日志写到标准错误，标准输出只保留 JSON 结果。
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

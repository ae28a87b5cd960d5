use std::fs;
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 50;

pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Folder for log files: the configured one, else `/log` in a container
/// and `./log` elsewhere. `None` when file logging is disabled.
pub fn log_folder(configured: Option<&str>, cgroup: Option<&str>) -> Option<PathBuf> {
    match configured {
        Some("") => None,
        Some(folder) => Some(PathBuf::from(folder)),
        None if cgroup.is_some_and(|c| c.contains("docker")) => Some(PathBuf::from("/log")),
        None => Some(PathBuf::from("log")),
    }
}

/// Daily-rotated `server.<date>.log` files under `folder`.
pub fn file_appender(folder: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("server")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(folder)
}

/// Install the global subscriber: console output plus, when possible, a
/// non-blocking rolling file. Keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init(cfg: &AppConfig) -> Option<WorkerGuard> {
    let cgroup = fs::read_to_string("/proc/1/cgroup").ok();
    let folder = log_folder(cfg.log_folder.as_deref(), cgroup.as_deref());

    let mut file_error = None;
    let appender = folder.as_deref().and_then(|dir| {
        fs::create_dir_all(dir)
            .map_err(|e| e.to_string())
            .and_then(|()| file_appender(dir).map_err(|e| e.to_string()))
            .map_err(|e| file_error = Some(format!("{}: {e}", dir.display())))
            .ok()
    });

    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(level_filter(&cfg.log_level))
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
    match (&folder, file_error) {
        (_, Some(err)) => tracing::warn!("File logging disabled, cannot open {err}"),
        (Some(dir), None) => tracing::info!("Writing logs to {}", dir.display()),
        (None, None) => tracing::info!("File logging disabled"),
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefers_configured_value() {
        assert_eq!(
            log_folder(Some("/srv/logs"), Some("0::/docker/abc")),
            Some(PathBuf::from("/srv/logs"))
        );
        assert_eq!(log_folder(Some(""), None), None);
    }

    #[test]
    fn folder_defaults_depend_on_container() {
        assert_eq!(
            log_folder(None, Some("12:pids:/docker/3f2a")),
            Some(PathBuf::from("/log"))
        );
        assert_eq!(log_folder(None, Some("0::/init.scope")), Some(PathBuf::from("log")));
        assert_eq!(log_folder(None, None), Some(PathBuf::from("log")));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(level_filter("verbose"), LevelFilter::INFO);
    }

    #[test]
    fn appender_builds_in_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_appender(dir.path()).is_ok());
    }
}

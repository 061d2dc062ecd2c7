use std::io::Write;
use std::path::Path;

/// Initialize logging for the coordinator process from a log4rs YAML file.
pub fn init_log(config_path: &Path) -> anyhow::Result<()> {
    log4rs::init_file(config_path, Default::default())?;
    Ok(())
}

/// Best-effort logger for tests. Safe to call from every test; only the
/// first call wins.
pub fn try_init_log() {
    let _ = env_logger::builder()
        .is_test(true)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}:{} - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

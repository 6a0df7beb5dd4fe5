use env_logger::{Builder, Env};
use log::{debug, info};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Once;
use chrono::Local;

static INIT: Once = Once::new();

/// Initialize the logging system
pub fn init_logger() {
    INIT.call_once(|| {
        let env = Env::default().filter_or("LOG_LEVEL", "info");

        // Log to a file as well when LOG_DIR is configured
        match log_file() {
            Some(file) => {
                let path = file.1;
                let mut builder = Builder::from_env(env);
                builder
                    .format(|buf, record| {
                        writeln!(
                            buf,
                            "{} [{}] - {}: {}",
                            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                            record.level(),
                            record.target(),
                            record.args()
                        )
                    })
                    .target(env_logger::Target::Pipe(Box::new(FileAndStdout {
                        file: file.0,
                    })))
                    .init();

                info!("Logging initialized: {}", path.display());
                debug!("Log level: {}", env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));
            }
            None => {
                let mut builder = Builder::from_env(env);
                builder
                    .format(|buf, record| {
                        writeln!(
                            buf,
                            "{} [{}] - {}: {}",
                            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                            record.level(),
                            record.target(),
                            record.args()
                        )
                    })
                    .init();
            }
        }
    });
}

/// Open the session log file under LOG_DIR, if configured
fn log_file() -> Option<(File, PathBuf)> {
    let dir = PathBuf::from(env::var("LOG_DIR").ok()?);

    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!("Failed to create log directory: {}", e);
        return None;
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = dir.join(format!("risk_engine_{}.log", timestamp));

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some((file, path)),
        Err(e) => {
            eprintln!("Failed to open log file, logging to stdout only: {}", e);
            None
        }
    }
}

/// Custom writer that writes to both a file and stdout
struct FileAndStdout {
    file: File,
}

impl Write for FileAndStdout {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()?;
        self.file.flush()?;
        Ok(())
    }
}

use std::fs::File;
use std::path::Path;

use clap::{Args, Parser, Subcommand};
use config::Configuration;
use log::info;

#[derive(Debug, Parser, Clone)]
#[command(author, about, version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Start(StartArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    /// The address that the coordinator binds and listens to, `host:port`.
    ///
    /// Default value is `127.0.0.1:9000`.
    ///
    /// If the coordinator is running inside a container, specify the address
    /// as `0.0.0.0:9000`.
    #[arg(long, env = "SC_ADDR")]
    addr: Option<String>,

    /// Path to the configuration file in YAML format.
    #[arg(long, env = "SC_CONFIG")]
    config: Option<String>,

    /// Path to the log4rs configuration file in YAML format.
    #[arg(long, env = "SC_LOG_CONFIG")]
    log: Option<String>,
}

impl StartArgs {
    pub fn init_log(&self) -> anyhow::Result<()> {
        let config = self.log.as_deref().unwrap_or("etc/coordinator-log.yaml");
        let config_path = Path::new(config);

        if !config_path.exists() {
            eprintln!("Log configuration file {} does not exist", config);
            // Exit with errno set
            std::process::exit(2);
        };

        if !config_path.is_file() {
            eprintln!("{} is not a file", config);
            // Exit with errno set
            std::process::exit(22);
        }

        ulog::init_log(config_path)?;
        info!("Log initialized");
        Ok(())
    }

    pub fn create_config(&self) -> anyhow::Result<Configuration> {
        let path = Path::new(self.config.as_deref().unwrap_or("etc/config.yaml"));
        let mut configuration: Configuration = if path.exists() && path.is_file() {
            serde_yaml::from_reader(File::open(path)?)?
        } else {
            Configuration::default()
        };

        if let Some(addr) = &self.addr {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| anyhow::anyhow!("--addr must be in `host:port` form"))?;
            configuration.server.host = host.to_owned();
            configuration.server.port = port.parse()?;
        }

        configuration.check_and_apply()?;
        Ok(configuration)
    }
}

use std::sync::Arc;

use clap::Parser;
use coordinator::cli::Commands;
use coordinator::Cli;
use metastore::MemorySegmentStore;
use tokio::sync::broadcast;

fn main() {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Start(args) => {
            args.init_log().unwrap();
            match args.create_config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!(
                        "Failed to create configuration from the specified configuration file. Cause: {:?}",
                        e
                    );
                    return;
                }
            }
        }
    };

    let (shutdown_tx, _rx) = broadcast::channel(1);
    let tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        println!("Received shutdown signal");
        if tx.send(()).is_err() {
            eprintln!("Could not send shutdown signal to shutdown channel");
        }
    })
    .expect("Failed to set Ctrl-C");

    // The standalone server keeps segment records in process memory; a
    // clustered deployment plugs a durable store in through the library API.
    let store = Arc::new(MemorySegmentStore::new());
    if let Err(e) = coordinator::server::launch(config, store, shutdown_tx) {
        eprintln!("Failed to start coordinator: {:?}", e);
    }
}

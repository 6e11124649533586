use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use uuid::Uuid;

use hubbub::command::is_channels_command;
use hubbub::{ChatApp, ChatOutcome, Config, LocalDirectory, LocalRecipient, Recipient};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = hubbub::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        hubbub::logging::init_console_only(&config.logging.level);
    }

    info!("hubbub console");

    let directory = Arc::new(LocalDirectory::new());
    let console = Arc::new(LocalRecipient::new(Uuid::new_v4(), "console").with_echo());
    console.grant(hubbub::recipient::WILDCARD_PERMISSION);
    directory.insert(console.clone());

    let app = ChatApp::bootstrap(&config, directory);
    let id = console.id();
    if let Err(e) = app.session_started(id).await {
        warn!("Console session started without stored state: {e}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        };

        if is_channels_command(&line) {
            for reply in app.command(id, &line) {
                println!("{reply}");
            }
            continue;
        }

        match app.chat(id, &line) {
            ChatOutcome::Delivered(_) | ChatOutcome::Empty => {}
            ChatOutcome::NoChannel => println!("You are not in a channel. Try /channels list."),
            ChatOutcome::Denied => println!("You may not talk in that channel."),
            ChatOutcome::NoChatter => println!("Chat is not ready yet."),
        }
    }

    if let Err(e) = app.session_ended(id).await {
        error!("Failed to save console chatter: {e}");
    }
    info!("Bye");
}

//! Command handlers for the blelink CLI

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use blelink_core::{FrameEvent, MAX_PAYLOAD_LEN};

use crate::app::{format_device, format_event, DeviceSelector, LinkApp};
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::PrintConfig => Self::handle_print_config_command(),
            Commands::Scan { json } => {
                let app = LinkApp::new(config).await?;
                Self::handle_scan_command(app, json).await
            }
            Commands::Chat { device } => {
                let app = LinkApp::new(config).await?;
                Self::handle_chat_command(app, DeviceSelector::parse(&device)).await
            }
            Commands::Send {
                device,
                message,
                hex,
            } => {
                let payload = parse_payload(&message, hex)?;
                let app = LinkApp::new(config).await?;
                Self::handle_send_command(app, DeviceSelector::parse(&device), payload).await
            }
        }
    }

    /// Handle the print-config command
    fn handle_print_config_command() -> Result<()> {
        println!("{}", AppConfig::example_config()?);
        Ok(())
    }

    /// Handle the scan command
    async fn handle_scan_command(mut app: LinkApp, json: bool) -> Result<()> {
        info!("Scanning for devices...");
        let devices = app.scan().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else if devices.is_empty() {
            println!("No devices found");
        } else {
            for (index, device) in devices.iter().enumerate() {
                println!("{}", format_device(index, device));
            }
        }

        app.shutdown().await
    }

    /// Handle the send command
    async fn handle_send_command(
        mut app: LinkApp,
        selector: DeviceSelector,
        payload: Vec<u8>,
    ) -> Result<()> {
        let device = app.connect(&selector).await?;
        app.await_ready().await?;

        app.send(payload.clone()).await?;
        println!("Sent {} bytes to {}", payload.len(), device);

        // Writes are fire-and-forget; let the radio drain before tearing down
        tokio::time::sleep(app.config().cli.send_grace()).await;

        app.handle().disconnect().await?;
        app.shutdown().await
    }

    /// Handle the chat command
    async fn handle_chat_command(mut app: LinkApp, selector: DeviceSelector) -> Result<()> {
        let device = app.connect(&selector).await?;
        app.await_ready().await?;

        let show_hex = app.config().cli.show_hex;
        let prompt = app.config().cli.prompt.clone();
        println!("Connected to {}. Type /quit to leave.", device);
        print_prompt(&prompt)?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) => {
                        if line.len() > MAX_PAYLOAD_LEN {
                            println!(
                                "Message too long: {} bytes (max: {})",
                                line.len(),
                                MAX_PAYLOAD_LEN
                            );
                        } else if !line.is_empty() {
                            app.send(line.into_bytes()).await?;
                        }
                        print_prompt(&prompt)?;
                    }
                    None => break,
                },
                event = app.next_event() => match event {
                    Some(event) => {
                        println!("\r{}", format_event(&event, show_hex));
                        if event == FrameEvent::Disconnected {
                            warn!("link closed by peer");
                            break;
                        }
                        print_prompt(&prompt)?;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        app.handle().disconnect().await?;
        app.shutdown().await
    }
}

/// Bytes to send for a command line message
pub fn parse_payload(message: &str, is_hex: bool) -> Result<Vec<u8>> {
    let payload = if is_hex {
        hex::decode(message.trim())?
    } else {
        message.as_bytes().to_vec()
    };

    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CliError::Core(blelink_core::BlelinkError::PayloadTooLarge {
            size: payload.len(),
            max_size: MAX_PAYLOAD_LEN,
        }));
    }
    Ok(payload)
}

fn print_prompt(prompt: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;
    Ok(())
}

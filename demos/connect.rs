//! Example: Connect to a CasparCG server and print what it reports.

use std::time::Duration;

use caspar_amcp::{AmcpClient, AmcpEvent, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ClientConfig::builder()
        .hostname("127.0.0.1")
        .port(5250)
        .auto_connect(true)
        .build();

    let client = AmcpClient::new(config);
    let mut events = client.subscribe();

    println!("Connecting to server...");
    client.connect().await?;
    client.refresh_mediafiles().await?;
    client.refresh_templates().await?;

    // VERSION and INFO are sent automatically on connect
    let mut pending = 4;
    while pending > 0 {
        match tokio::time::timeout(Duration::from_secs(10), events.recv()).await {
            Ok(Ok(AmcpEvent::VersionUpdated(version))) => {
                println!("\n--- Server ---");
                println!("  Version: {}", version);
                pending -= 1;
            }
            Ok(Ok(AmcpEvent::ChannelListUpdated(channels))) => {
                println!("\n--- Channels ({}) ---", channels.len());
                for channel in &channels {
                    println!("  Channel {:2}: {}", channel.id, channel.video_mode);
                }
                pending -= 1;
            }
            Ok(Ok(AmcpEvent::MediaListUpdated(media))) => {
                println!("\n--- Media ({}) ---", media.len());
                for file in &media {
                    println!(
                        "  {:40} {:6} {:>12} bytes  {}  {:.2} fps",
                        file.full_name(),
                        file.media_type,
                        file.size,
                        file.timecode,
                        file.fps,
                    );
                }
                pending -= 1;
            }
            Ok(Ok(AmcpEvent::TemplateListUpdated(templates))) => {
                println!("\n--- Templates ({}) ---", templates.len());
                for template in &templates {
                    let updated = template
                        .last_updated
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!("  {:40} {:>8} bytes  {}", template.full_name(), template.size, updated);
                }
                pending -= 1;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                println!("Event stream error: {}", e);
                break;
            }
            Err(_) => {
                println!("Timed out waiting for the server");
                break;
            }
        }
    }

    println!("\nPress Ctrl+C to disconnect...");
    tokio::signal::ctrl_c().await?;
    client.disconnect().await;
    println!("Disconnected.");

    Ok(())
}

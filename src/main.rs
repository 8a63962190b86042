mod cli;
mod connection;
mod protocol;
mod rendezvous;
mod session;
mod transfer;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use rendezvous::RendezvousClient;
use session::{Session, SessionEvent};
use transfer::OutgoingFile;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default = if cli.verbose {
        "droplink=debug"
    } else {
        "droplink=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => rendezvous::run_server(port).await,
        Commands::Open { rendezvous, output } => open_session(&rendezvous, output).await,
    }
}

async fn open_session(addr: &str, output: PathBuf) -> Result<()> {
    let client = RendezvousClient::connect(addr).await?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(cmd_tx);
    tokio::spawn(client.run(event_tx, cmd_rx));

    println!("droplink session");
    println!("═══════════════════════════════════════");
    print_help();
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    println!("Rendezvous link lost.");
                    break;
                };
                apply_event(&mut session, event, &output).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch_command(&mut session, line.trim()).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Feed one event to the session, then surface whatever changed.
async fn apply_event(session: &mut Session, event: SessionEvent, output: &Path) -> Result<()> {
    let identity_event = matches!(&event, SessionEvent::IdentityReady { .. });
    let prev_status = session.state().status.clone();
    let prev_progress = session.state().progress;

    session.handle_event(event);

    let state = session.state();
    if state.progress != prev_progress && state.progress > 0 {
        print_progress(state.progress);
    }
    if state.status != prev_status {
        if prev_progress > 0 {
            println!();
        }
        println!("{}", state.status);
    }
    if identity_event {
        if let Some(id) = &state.local_id {
            println!("Your identifier: {}", id);
        }
    }

    if let Some(file) = session.take_received_file() {
        let path = output.join(artifact_file_name(&file.name));
        tokio::fs::write(&path, &file.bytes).await?;
        println!(
            "Saved \"{}\" ({} bytes, {}) to {}",
            file.name,
            file.bytes.len(),
            file.content_type,
            path.display()
        );
    }
    Ok(())
}

/// Handle one console line. Returns false when the session should end.
async fn dispatch_command(session: &mut Session, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => true,
        Some("connect") => {
            match parts.next() {
                Some(id) => {
                    if session.state().local_id.is_none() {
                        println!("Not ready yet: no identifier assigned.");
                    } else {
                        session.set_remote_input(id);
                        session.connect();
                        println!("{}", session.state().status);
                    }
                }
                None => println!("usage: connect <id>"),
            }
            true
        }
        Some("send") => {
            let path = line.strip_prefix("send").unwrap_or_default().trim();
            if path.is_empty() {
                println!("usage: send <path>");
                return true;
            }
            match OutgoingFile::from_path(Path::new(path)).await {
                Ok(file) => match session.send_file(&file) {
                    Ok(()) => println!("Sent \"{}\" ({} bytes).", file.name(), file.size()),
                    Err(e) => println!("Send failed: {}", e),
                },
                Err(e) => println!("Cannot send: {}", e),
            }
            true
        }
        Some("disconnect") => {
            session.disconnect();
            true
        }
        Some("status") => {
            let state = session.state();
            println!(
                "  identifier: {}",
                state.local_id.as_deref().unwrap_or("(pending)")
            );
            println!("  status:     {}", state.status);
            println!("  connected:  {}", state.connected);
            if state.progress > 0 {
                println!("  progress:   {}%", state.progress);
            }
            true
        }
        Some("help") => {
            print_help();
            true
        }
        Some("quit") | Some("exit") => false,
        Some(other) => {
            println!("Unknown command: {} (try \"help\")", other);
            true
        }
    }
}

fn print_help() {
    println!("Commands: connect <id> | send <path> | disconnect | status | help | quit");
}

fn print_progress(progress: u8) {
    print!("\rReceiving: {:>3}%   ", progress);
    let _ = std::io::stdout().flush();
}

/// Strip any path components a peer put into the declared file name.
fn artifact_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "received.bin".to_string())
}

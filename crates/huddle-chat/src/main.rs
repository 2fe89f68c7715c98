//! Huddle chat client.
//!
//! Connects to a relay, logs in once greeted, prints presence changes and
//! incoming messages, and sends every stdin line as a chat message.
//!
//! # Usage
//!
//! ```bash
//! huddle-chat --server 127.0.0.1:7878 --username alice
//! ```

mod render;

use clap::Parser;
use huddle_client::{Session, SessionError, SessionUpdate, TcpChannel};
use huddle_core::SystemEnv;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat client
#[derive(Parser, Debug)]
#[command(name = "huddle-chat")]
#[command(about = "Line-oriented Huddle chat client")]
#[command(version)]
struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Name shown to other participants
    #[arg(short, long)]
    username: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut session = Session::new(TcpChannel::new(args.server.clone()), SystemEnv::new());
    let mut stdout = tokio::io::stdout();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_login = Some(args.username);

    let updates = session.open().await?;
    tracing::info!("connected to {}", args.server);
    show(&mut stdout, &updates).await?;

    loop {
        tokio::select! {
            updates = session.next_event() => {
                let Some(updates) = updates else { break };
                show(&mut stdout, &updates).await?;

                let greeted = updates.iter().any(|u| matches!(u, SessionUpdate::Greeted { .. }));
                if greeted && let Some(username) = pending_login.take() {
                    session.submit_username(&username)?;
                }
            },
            line = stdin.next_line() => {
                let Some(text) = line? else { break };
                match session.send_message(&text) {
                    Ok(()) | Err(SessionError::EmptyMessage) => {},
                    Err(SessionError::NotLoggedIn | SessionError::AwaitingGreeting) => {
                        show_line(&mut stdout, "! not logged in yet").await?;
                    },
                    Err(e @ SessionError::Protocol(_)) => {
                        show_line(&mut stdout, &format!("! message not sent: {e}")).await?;
                    },
                    Err(e) => return Err(e.into()),
                }
            },
        }
    }

    show(&mut stdout, &session.close()).await?;
    Ok(())
}

async fn show(stdout: &mut Stdout, updates: &[SessionUpdate]) -> std::io::Result<()> {
    for line in updates.iter().filter_map(render::render_update) {
        show_line(stdout, &line).await?;
    }
    Ok(())
}

async fn show_line(stdout: &mut Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

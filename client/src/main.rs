use clap::Parser;
use client::{BackoffConfig, Command, Session, SessionUpdate, Synchronizer, Transport};
use log::info;
use shared::{Action, Identity, ListKind, MarchingBands, DEFAULT_GRID_SIZE};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = "lobby")]
    room: String,

    /// Side length of the puzzle grid
    #[arg(short = 'g', long, default_value_t = DEFAULT_GRID_SIZE)]
    grid_size: usize,

    /// Base reconnect delay in milliseconds
    #[arg(long, default_value = "100")]
    backoff_unit_ms: u64,

    /// Largest backoff exponent
    #[arg(long, default_value = "10")]
    backoff_max: u32,

    /// Reuse a previously printed private id instead of generating one
    #[arg(long)]
    identity: Option<String>,
}

const HELP: &str = "commands: set <row> <col> <text> | clear <row> <col> | \
mark <row|band> <index> <start> <end> | unmark <row|band> <index> <at> | \
cursor <row> <col> | quit";

fn parse_list_kind(word: &str) -> Result<ListKind, String> {
    match word {
        "row" => Ok(ListKind::Row),
        "band" => Ok(ListKind::Band),
        other => Err(format!("unknown list kind '{}'", other)),
    }
}

fn parse_index(word: Option<&str>) -> Result<usize, String> {
    let word = word.ok_or("missing argument")?;
    word.parse()
        .map_err(|_| format!("'{}' is not a valid index", word))
}

/// Turns one input line into a command, `None` for blank lines
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let action = match verb {
        "set" => {
            let row = parse_index(words.next())?;
            let col = parse_index(words.next())?;
            let text = words.next().ok_or("missing text")?;
            Action::set_cell(row, col, text)
        }
        "clear" => Action::clear_cell(parse_index(words.next())?, parse_index(words.next())?),
        "mark" => {
            let kind = parse_list_kind(words.next().ok_or("missing list kind")?)?;
            let index = parse_index(words.next())?;
            let start = parse_index(words.next())?;
            let end = parse_index(words.next())?;
            Action::mark_segment(kind, index, start, end)
        }
        "unmark" => {
            let kind = parse_list_kind(words.next().ok_or("missing list kind")?)?;
            let index = parse_index(words.next())?;
            let at = parse_index(words.next())?;
            Action::clear_segment(kind, index, at)
        }
        "cursor" => Action::set_cursor(parse_index(words.next())?, parse_index(words.next())?),
        "quit" | "leave" => return Ok(Some(Command::Leave)),
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(Command::Submit(action)))
}

fn describe(update: &SessionUpdate) -> String {
    match update {
        SessionUpdate::Connected { resent } => format!("connected ({} pending resent)", resent),
        SessionUpdate::Reconnecting { delay } => {
            format!("connection lost, retrying in {}ms", delay.as_millis())
        }
        SessionUpdate::Remote(outcome) => format!("{:?}", outcome),
        SessionUpdate::Rejected(reason) => format!("rejected: {}", reason),
        SessionUpdate::Solved => "puzzle solved!".to_string(),
        SessionUpdate::Disconnected => "disconnected".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let identity = match &args.identity {
        Some(private_id) => Identity::from_private(private_id.clone())?,
        None => Identity::generate(),
    };
    info!("Starting client...");
    info!("Private id: {} (public {})", identity.private_id(), identity.public_id());
    info!("Connecting to {} room {}", args.server, args.room);

    let backoff = BackoffConfig {
        min: 0,
        max: args.backoff_max,
        unit: Duration::from_millis(args.backoff_unit_ms),
    };
    let transport = Transport::new(args.server.clone(), backoff);
    let sync = Synchronizer::new(
        args.room.clone(),
        &MarchingBands::new(args.grid_size),
        identity,
        transport,
    );

    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (commands, commands_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(sync).with_updates(updates_tx);

    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            println!("{}", describe(&update));
        }
    });

    tokio::spawn(async move {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Ok(Some(command)) => {
                    let leaving = matches!(command, Command::Leave);
                    if commands.send(command).is_err() || leaving {
                        break;
                    }
                }
                Ok(None) => {}
                Err(reason) => println!("{} ({})", reason, HELP),
            }
        }
    });

    session.run(commands_rx).await?;
    info!("Client stopped");

    Ok(())
}

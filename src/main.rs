//! Matey terminal client
//!
//! Connects to the broker, reads commands from stdin and prints the board
//! whenever the position changes.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use matey_sync::{
    client::{ClientCommand, ClientEvent, ClientView, GameClient, TracingSink},
    config::{identity_from_env, ClientConfig},
    core::Square,
    game::PieceKind,
    network::WsGateway,
    SessionState, VERSION,
};

const HELP: &str = "commands: find | cancel | select <sq> | promote <q|r|b|n> | unpromote | \
mark <sq> | resign | ack | board | roster | who | help | quit";

/// Parsed stdin line.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(ClientCommand),
    PrintBoard,
    PrintRoster,
    Help,
}

fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let square = |arg: Option<&str>| -> Result<Square, String> {
        let text = arg.ok_or("missing square")?;
        Square::parse(text).ok_or_else(|| format!("bad square {text:?}"))
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "find" => Input::Send(ClientCommand::FindGame),
        "cancel" => Input::Send(ClientCommand::CancelSearch),
        "select" | "s" => Input::Send(ClientCommand::Select(square(arg)?)),
        "promote" | "p" => {
            let letter = arg.and_then(|a| a.chars().next()).ok_or("missing piece")?;
            let kind = PieceKind::from_letter(letter).ok_or_else(|| format!("bad piece {letter:?}"))?;
            Input::Send(ClientCommand::Promote(kind))
        }
        "unpromote" => Input::Send(ClientCommand::CancelPromotion),
        "mark" | "m" => Input::Send(ClientCommand::ToggleMark(square(arg)?)),
        "resign" => Input::Send(ClientCommand::Resign),
        "ack" => Input::Send(ClientCommand::Acknowledge),
        "who" => Input::Send(ClientCommand::RequestRoster),
        "quit" | "exit" => Input::Send(ClientCommand::Shutdown),
        "board" => Input::PrintBoard,
        "roster" => Input::PrintRoster,
        "help" | "?" => Input::Help,
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok(Some(input))
}

fn print_board(view: &ClientView) {
    match view.session.as_ref() {
        SessionState::Active(session) => {
            let turn = if session.is_local_turn() { "your move" } else { "waiting for opponent" };
            println!("{}\nvs {} as {}, {}", session.board, session.opponent, session.color, turn);
            if let Some(origin) = view.highlights.origin {
                let options: Vec<String> = view.highlights.options.keys().map(|sq| sq.to_string()).collect();
                println!("selected {origin}: {}", options.join(" "));
            }
            if let Some(pending) = view.highlights.pending_promotion {
                println!("promote {}{}: q r b n", pending.origin, pending.dest);
            }
        }
        other => println!("[{}]", other.name()),
    }
}

fn print_roster(view: &ClientView) {
    println!("online: {}", view.online_count.map_or("?".to_string(), |n| n.to_string()));
    for (id, entry) in view.roster.iter() {
        let busy = if entry.in_game { " (in game)" } else { "" };
        println!("  {} [{}]{}", entry.display_name, id, busy);
    }
}

/// Print the board each time the session snapshot changes.
async fn watch_view(mut views: watch::Receiver<Arc<ClientView>>) {
    let mut shown: Option<Arc<SessionState>> = None;
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        let changed = shown.as_ref().map_or(true, |s| !Arc::ptr_eq(s, &view.session));
        if changed || view.highlights.origin.is_some() {
            print_board(&view);
            shown = Some(view.session.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let identity = identity_from_env();
    info!("Matey client v{}", VERSION);
    info!(participant = %identity.id, name = %identity.display_name, broker = %config.broker_url, "Starting");

    let (events_tx, events_rx) = mpsc::channel::<ClientEvent>(config.event_queue_capacity);
    let gateway = WsGateway::spawn(&config, &identity, events_tx.clone());
    let (client, views) = GameClient::new(identity, gateway, TracingSink);
    let client_task = tokio::spawn(client.run(events_rx));
    let view_task = tokio::spawn(watch_view(views.clone()));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        match parse_input(&line) {
            Ok(Some(Input::Send(ClientCommand::Shutdown))) => break,
            Ok(Some(Input::Send(command))) => {
                if events_tx.send(command.into()).await.is_err() {
                    break;
                }
            }
            Ok(Some(Input::PrintBoard)) => print_board(&views.borrow()),
            Ok(Some(Input::PrintRoster)) => print_roster(&views.borrow()),
            Ok(Some(Input::Help)) => println!("{HELP}"),
            Ok(None) => {}
            Err(message) => println!("{message}\n{HELP}"),
        }
    }

    // Shutdown; the loop may already be gone if the queue closed.
    let _ = events_tx.send(ClientCommand::Shutdown.into()).await;
    let gateway = client_task.await.context("client task panicked")?;
    gateway.shutdown().await;
    view_task.abort();
    info!("Bye");
    Ok(())
}

//! `Task Flow`: kanban board shell.
//!
//! Reads commands line by line and prints the board as it changes. With a
//! relay configured, signed-in boards live on the relay and follow its
//! feed; otherwise accounts and boards only last for the process. Guest
//! boards are always kept on this device.
//!
//! ```bash
//! # Guest board only
//! cargo run --bin taskflow
//!
//! # Sign in against a relay
//! cargo run --bin taskflow -- --relay-url ws://127.0.0.1:9100/ws
//!
//! # Or via environment variables
//! TASKFLOW_RELAY_URL=ws://127.0.0.1:9100/ws cargo run --bin taskflow
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskflow::board::Board;
use taskflow::cli::{self, Command, HELP, ParseError};
use taskflow::config::{CliArgs, ClientConfig};
use taskflow::identity::memory::MemoryIdentityProvider;
use taskflow::identity::{Identity, IdentityProvider};
use taskflow::remote::RemoteStore;
use taskflow::remote::memory::MemoryRemoteStore;
use taskflow::remote::relay::RelayClient;
use taskflow::session::Session;
use taskflow::store::LocalStore;
use taskflow::store::file::FileStore;
use taskflow::sync::{Celebrate, SyncUpdate, TaskSyncController};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskflow starting");

    let local = FileStore::new(&config.data_dir);
    tracing::info!(path = %local.path().display(), "guest board record");
    let celebrate = || println!("\n  *** Task done. Nice work! ***\n");
    let lines = spawn_stdin_reader();

    if let Some(url) = &config.relay_url {
        match RelayClient::connect_with_timeouts(url, config.connect_timeout, config.request_timeout)
            .await
        {
            Ok(client) => {
                println!("Connected to relay at {url}");
                let client = Arc::new(client);
                let controller = TaskSyncController::new(local, Arc::clone(&client), celebrate)
                    .with_write_timeout(config.write_timeout);
                run(Session::new(client, controller), lines).await;
                tracing::info!("taskflow exiting");
                return;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "relay unreachable");
                eprintln!("Could not reach relay at {url}: {e}");
                eprintln!("Accounts and signed-in boards will only last for this session.");
            }
        }
    }

    let controller = TaskSyncController::new(local, Arc::new(MemoryRemoteStore::new()), celebrate)
        .with_write_timeout(config.write_timeout);
    run(Session::new(MemoryIdentityProvider::new(), controller), lines).await;
    tracing::info!("taskflow exiting");
}

/// Initialize file-based logging.
///
/// Logs go to a file so they never interleave with the board on stdout.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskflow.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Forward stdin lines from a blocking thread.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Shell loop: commands from stdin, board updates from the controller.
async fn run<P, L, R, C>(mut session: Session<P, L, R, C>, mut lines: mpsc::UnboundedReceiver<String>)
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    println!("Task Flow. Type `guest` to start on this device, `help` for commands.");
    prompt();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(&mut session, command).await,
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
                prompt();
            }
            update = session.controller_mut().next_update() => {
                let Some(update) = update else { break };
                if report(&update) {
                    show(&session);
                    prompt();
                }
            }
        }
    }
}

async fn execute<P, L, R, C>(session: &mut Session<P, L, R, C>, command: Command)
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    match command {
        Command::Guest => {
            session.continue_as_guest().await;
            show(session);
        }
        Command::Login { email, password } => {
            announce_auth(session.sign_in(&email, &password).await);
        }
        Command::Signup { email, password } => {
            announce_auth(session.sign_up(&email, &password).await);
        }
        Command::Provider => announce_auth(session.sign_in_with_provider().await),
        Command::Logout => {
            session.sign_out().await;
            println!("Signed out.");
        }
        Command::Add(draft) => match session.controller_mut().add_task(draft) {
            Ok(Some(id)) => {
                println!("Added {id}");
                show_if_guest(session);
            }
            Ok(None) => println!("Sign in or type `guest` first."),
            Err(e) => println!("{e}"),
        },
        Command::Move { id, status } => {
            let Some(id) = lookup(session, &id) else { return };
            if session.controller_mut().move_task(&id, status) {
                show_if_guest(session);
            } else {
                println!("{id} is already there.");
            }
        }
        Command::Remove { id } => {
            let Some(id) = lookup(session, &id) else { return };
            if session.controller_mut().delete_task(&id) {
                show_if_guest(session);
            }
        }
        Command::Edit { id, edit } => {
            let Some(id) = lookup(session, &id) else { return };
            let Some(mut task) = session.controller().task(&id).cloned() else {
                return;
            };
            edit.apply(&mut task);
            match session.controller_mut().update_task_details(task) {
                Ok(true) => show_if_guest(session),
                Ok(false) => println!("Nothing changed on {id}."),
                Err(e) => println!("{e}"),
            }
        }
        Command::Show => show(session),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

/// Resolve an abbreviated id against the board, printing why it failed.
fn lookup<P, L, R, C>(session: &Session<P, L, R, C>, input: &str) -> Option<taskflow_proto::task::TaskId>
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    if matches!(session.identity(), Identity::Unauthenticated) {
        println!("Sign in or type `guest` first.");
        return None;
    }
    cli::resolve_id(session.controller().tasks(), input)
        .map_err(|e| println!("{e}"))
        .ok()
}

fn announce_auth(result: Result<(), taskflow::identity::AuthError>) {
    match result {
        Ok(()) => println!("Signed in. Loading your board..."),
        Err(e) => println!("{e}"),
    }
}

/// Print a controller update. Returns whether the board changed.
fn report(update: &SyncUpdate) -> bool {
    match update {
        SyncUpdate::Loaded { .. } | SyncUpdate::Replaced { .. } => true,
        SyncUpdate::Seeded { count } => {
            println!("\nYour board was empty, added {count} starter tasks.");
            true
        }
        SyncUpdate::FellBack {
            kind,
            task_id,
            error,
        } => {
            println!("\nCould not save {kind} of {task_id} ({error}), kept on screen only.");
            true
        }
        SyncUpdate::Stale => false,
    }
}

fn show_if_guest<P, L, R, C>(session: &Session<P, L, R, C>)
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    if matches!(session.identity(), Identity::Guest) {
        show(session);
    }
}

fn show<P, L, R, C>(session: &Session<P, L, R, C>)
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    let controller = session.controller();
    println!("\n[{}, {}]", session.identity(), controller.state());
    print!("{}", Board::from_tasks(controller.tasks()));
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

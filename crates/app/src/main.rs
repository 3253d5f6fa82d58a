//! livepip - live picture-in-picture mirrors of other windows
//!
//! Subcommands:
//! - `livepip run` - Listen for the hotkey and toggle PiPs (default)
//! - `livepip list` - Print capturable windows
//! - `livepip open <id>` - Run with a PiP already open for one window
//! - `livepip hotkey show|rebind|reset` - Inspect or change the shortcut

use anyhow::{bail, Result};
use capture::{search, WindowId};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use hotkey::{HotkeyConfig, HotkeyMatcher, HotkeyStore, KeyEvent, KeyOutcome, KeySink};
use livepip::platform::{install_key_source, Platform};
use livepip::{config, init_logging, UiContext};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "livepip")]
#[command(about = "Floating live mirrors of other application windows")]
#[command(version)]
struct Cli {
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for the hotkey (default)
    Run,

    /// Print the windows that can be mirrored
    List {
        /// Case-insensitive filter on title or application
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Open a PiP for one window, then keep running
    Open {
        /// Window id as printed by `list`
        window_id: u64,
    },

    /// Inspect or change the global shortcut
    Hotkey {
        #[command(subcommand)]
        action: HotkeyAction,
    },
}

#[derive(Subcommand)]
enum HotkeyAction {
    /// Print the active shortcut
    Show,
    /// Learn a new shortcut from the next key press
    Rebind,
    /// Restore the built-in shortcut
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(None),
        Commands::List { search } => list(search.as_deref()),
        Commands::Open { window_id } => run(Some(WindowId(window_id))),
        Commands::Hotkey { action } => match action {
            HotkeyAction::Show => {
                let store = config::hotkey_store()?;
                println!("{}", hotkey::load_or_default(&store));
                Ok(())
            }
            HotkeyAction::Rebind => rebind(),
            HotkeyAction::Reset => {
                let store = config::hotkey_store()?;
                let chord = HotkeyConfig::default();
                store.save(&chord)?;
                println!("{chord}");
                Ok(())
            }
        },
    }
}

fn list(query: Option<&str>) -> Result<()> {
    let platform = Platform::native()?;
    let windows = platform.catalog().list_capturable_windows()?;

    for window in search(&windows, query.unwrap_or("")) {
        println!(
            "{:>10}  {:>11}  {} - {}",
            window.id.0,
            window.size_label(),
            window.owner_app_name,
            window.title
        );
    }
    Ok(())
}

fn run(open: Option<WindowId>) -> Result<()> {
    let platform = Platform::native()?;
    let catalog = platform.catalog();
    let matcher = HotkeyMatcher::new(Box::new(config::hotkey_store()?));

    let initial = match open {
        Some(id) => {
            let windows = catalog.list_capturable_windows()?;
            match windows.into_iter().find(|w| w.id == id) {
                Some(window) => Some(window),
                None => bail!("No capturable window with id {}", id.0),
            }
        }
        None => None,
    };

    let ctx = UiContext::new(
        catalog,
        platform.streams.clone(),
        platform.surfaces.clone(),
        matcher,
    );
    let handle = ctx.handle();

    // without a key source the app still mirrors windows opened by id
    let _keys = match install_key_source(handle.key_sink()) {
        Ok(source) => Some(source),
        Err(e) => {
            warn!(event = "app.main.hotkey_inactive", error = %e);
            None
        }
    };

    if let Some(window) = initial {
        handle.toggle(window);
    }

    info!(event = "app.main.running", hotkey = %ctx.matcher().config());
    ctx.run();
    Ok(())
}

fn rebind() -> Result<()> {
    let mut matcher = HotkeyMatcher::new(Box::new(config::hotkey_store()?));
    let (tx, rx) = unbounded::<KeyEvent>();
    let sink: KeySink = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    let _keys = install_key_source(sink)?;

    matcher.begin_rebind();
    println!("Current: {}. Press the new shortcut...", matcher.config());

    while let Ok(event) = rx.recv() {
        match matcher.handle_key_down(&event) {
            KeyOutcome::Rebound(chord) => {
                println!("Shortcut set to {chord}");
                return Ok(());
            }
            KeyOutcome::RebindCancelled => {
                bail!("Shortcut needs at least one modifier; kept {}", matcher.config())
            }
            KeyOutcome::Ignored | KeyOutcome::Triggered => {}
        }
    }
    bail!("Key source stopped before a shortcut was pressed")
}

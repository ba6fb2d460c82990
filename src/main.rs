//! Runs a scripted session against the lap screen and logs what it shows.
//!
//! Usage: `livelist [settings-file]`. Without an argument a `livelist.toml` in
//! the working directory is read if present; `LIVELIST__DATABASE__MODE=file`
//! and friends override either.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use livelist::config::Settings;
use livelist::screen::LapScreen;
use livelist::store::Store;

fn show(step: &str, screen: &LapScreen) {
    info!(step, title = screen.title(), footer = screen.footer(), "screen");
    for (row, text) in screen.rows().iter().enumerate() {
        info!(row, %text, "cell");
    }
}

fn session(settings: &Settings) -> livelist::Result<()> {
    let store = Store::open(settings.persistence_mode())?;
    let mut screen = LapScreen::load(&store, &settings.screen)?;
    show("loaded", &screen);

    screen.tap_add_two_laps();
    screen.run_loop()?;
    show("added two laps", &screen);

    for _ in 0..3 {
        screen.tap_tick();
    }
    screen.run_loop()?;
    show("ticked three times", &screen);

    screen.tap_add_two_laps();
    screen.run_loop()?;
    screen.select_row(0)?;
    screen.run_loop()?;
    show("added two more and deleted the newest", &screen);

    screen.teardown();
    Ok(())
}

fn main() -> ExitCode {
    let file = std::env::args().nth(1);
    let settings = match Settings::load(file.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter)),
        )
        .init();
    info!(?settings, "starting");
    match session(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}

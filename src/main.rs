use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};
use tracing::{error, info};

mod app;
mod ui;

use app::{App, AppMode};
use csv_editor::{TableModel, logging};

#[derive(Parser, Debug)]
#[command(author, version, about = "Delimited text table editor")]
struct Args {
    /// Path to the delimited text file
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Field delimiter (`\t` is accepted for tab)
    #[arg(
        short,
        long,
        default_value = ",",
        env = "CSV_EDITOR_DELIMITER",
        value_parser = parse_delimiter
    )]
    delimiter: String,

    /// Log file (defaults to csv-editor.log in the temp dir)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn parse_delimiter(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("delimiter must not be empty".into());
    }
    Ok(raw.replace("\\t", "\t"))
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("csv-editor.log"));
    let _log_guard = logging::init(&log_file)?;

    let model = TableModel::open(&args.path, &args.delimiter)
        .with_context(|| format!("load table from {}", args.path.display()))?;

    let mut terminal = setup_terminal()?;
    let mut app = App::new(model, args.path, args.delimiter);

    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(250);

    let res = run_app(&mut terminal, &mut app, tick_rate, &mut last_tick);

    restore_terminal(terminal)?;
    if let Err(e) = res {
        error!(error = %e, "event loop failed");
        eprintln!("Error: {e:?}");
    }
    info!(dirty = app.model.is_dirty(), "exiting");
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
    last_tick: &mut Instant,
) -> Result<()> {
    // Redraw only when state changes or on tick
    let mut dirty = true;
    loop {
        if app.pump_events() {
            dirty = true;
        }

        let tick_due = last_tick.elapsed() >= tick_rate;
        if dirty || tick_due {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
            if tick_due {
                *last_tick = Instant::now();
            }
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match app.mode {
                        AppMode::Normal => handle_key_normal(app, key),
                        AppMode::Editing { .. } => handle_key_editing(app, key),
                        AppMode::Filtering => handle_key_filter(app, key),
                    }
                    dirty = true;
                }
                Event::Resize(..) => dirty = true,
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key_normal(app: &mut App, key: KeyEvent) {
    if key.code != KeyCode::Char('q') {
        app.disarm_quit();
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('s') => app.save(),
            KeyCode::Char('c') => app.request_quit(),
            _ => {}
        }
        return;
    }
    match key.code {
        KeyCode::Char('q') => app.request_quit(),
        KeyCode::Char('?') => {
            app.toggle_help();
            app.status = if app.show_help {
                "Showing keybinds (press ? to close)".into()
            } else {
                "Closed keybinds".into()
            };
        }
        KeyCode::Up | KeyCode::Char('k') => app.move_cell_up(),
        KeyCode::Down | KeyCode::Char('j') => app.move_cell_down(),
        KeyCode::Left | KeyCode::Char('h') => app.move_cell_left(),
        KeyCode::Right | KeyCode::Char('l') => app.move_cell_right(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::Home | KeyCode::Char('g') => app.move_to_first_row(),
        KeyCode::End | KeyCode::Char('G') => app.move_to_last_row(),
        KeyCode::Enter | KeyCode::Char('e') => app.begin_edit_cell(),
        KeyCode::Char('a') => app.append_row(),
        KeyCode::Char('w') => app.save(),
        KeyCode::Char('/') => app.begin_filter_input(),
        KeyCode::Char('s') => app.sort_cycle_on_selection(),
        KeyCode::Esc => {
            if app.show_help {
                app.toggle_help();
            } else if app.view.active().is_some() {
                app.clear_filter();
            }
        }
        _ => {}
    }
}

fn handle_key_editing(app: &mut App, key: KeyEvent) {
    use crossterm::event::KeyCode::*;

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == Char('c') {
        app.cancel_edit_cell();
        return;
    }
    match key.code {
        Enter => app.submit_cell_edit(),
        Esc => app.cancel_edit_cell(),
        Backspace => app.edit_input_backspace(),
        Delete => app.edit_input_delete(),
        Left => app.edit_input_left(),
        Right => app.edit_input_right(),
        Home => app.edit_input_home(),
        End => app.edit_input_end(),
        // ignore control chars in insert
        Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.edit_input_insert(c),
        _ => {}
    }
}

fn handle_key_filter(app: &mut App, key: KeyEvent) {
    use crossterm::event::KeyCode::*;

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == Char('c') {
        app.clear_filter();
        return;
    }
    match key.code {
        Enter => app.finish_filter_input(),
        Esc => app.clear_filter(),
        Backspace => app.backspace_filter_input(),
        Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.update_filter_input_char(c)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let model = TableModel::parse("fruit\napple\nbanana\n", ",");
        let path = dir.path().join("fruit.csv");
        (dir, App::new(model, path, ",".into()))
    }

    fn ctrl_c() -> KeyEvent {
        KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
    }

    #[test]
    fn ctrl_c_cancels_cell_edit() {
        let (_dir, mut app) = app();
        handle_key_normal(&mut app, KeyEvent::new(KeyCode::Char('e'), KeyModifiers::NONE));
        handle_key_editing(&mut app, KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE));
        handle_key_editing(&mut app, ctrl_c());
        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.model.get_cell(0, 0), Ok("apple"));
        assert!(!app.model.is_dirty());
    }

    #[test]
    fn ctrl_c_leaves_filter_input() {
        let (_dir, mut app) = app();
        handle_key_normal(&mut app, KeyEvent::new(KeyCode::Char('/'), KeyModifiers::NONE));
        handle_key_filter(&mut app, KeyEvent::new(KeyCode::Char('b'), KeyModifiers::NONE));
        assert_eq!(app.visible, vec![1]);
        handle_key_filter(&mut app, ctrl_c());
        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.view.active().is_none());
        assert_eq!(app.visible, vec![0, 1]);
    }
}

mod backend;
mod config;
mod error;
mod list;
mod ui;

use backend::cache::CoverCache;
use backend::covers::{OpenLibraryCovers, TcpProbe};
use backend::library::ItemStore;
use backend::progress::ProgressFetcher;
use backend::resolver::FallbackResolver;
use backend::storage::{SqliteStorage, Storage};
use config::Config;
use list::binder::{LoadEvent, Loader, SlotBinder};
use ui::ui::{App, rows_for_height, ui};

use clap::{Parser, Subcommand};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use ratatui_image::picker::Picker;
use std::path::PathBuf;
use std::sync::Arc;
use std::{error::Error, fs, io};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "bookshelf-tui")]
#[command(about = "Audiobook shelf with lazily loaded covers and progress")]
#[command(version)]
struct Cli {
    /// Path to config.json (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a book to the library
    Add {
        name: String,
        /// Total playing time in milliseconds
        #[arg(long, default_value_t = 0)]
        duration_ms: i64,
    },

    /// Record the playback position of a book
    Progress { id: i64, position_ms: i64 },

    /// Print the library with progress
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let config = Config::load(&config_path)?;
    init_logging(&config)?;

    let storage = Arc::new(SqliteStorage::open(&config.database_path).await?);

    match cli.command {
        Some(Commands::Add { name, duration_ms }) => {
            let item = storage.add(&name, duration_ms).await?;
            println!("Added #{} {}", item.id, item.name);
            return Ok(());
        }
        Some(Commands::Progress { id, position_ms }) => {
            storage.set_position(id, position_ms).await?;
            return Ok(());
        }
        Some(Commands::List) => {
            for item in storage.items().await? {
                let progress = storage.progress(&item).await?;
                println!(
                    "{:>5}  {:>5.1}%  {}",
                    item.id,
                    progress as f64 / 10.0,
                    item.name
                );
            }
            return Ok(());
        }
        None => {}
    }

    let store = ItemStore::new(storage.items().await?);
    log::info!("loaded {} books from {}", store.count(), config.database_path.display());

    // Channel for fetch results coming back from workers
    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<LoadEvent>();

    let resolver = FallbackResolver::new(
        CoverCache::new(config.cover_dir.clone(), config.thumb_size),
        Arc::new(OpenLibraryCovers::new(&config)?),
        Arc::new(TcpProbe::from_config(&config)),
        storage.clone(),
    );
    let loader = Loader::new(
        Arc::new(resolver),
        ProgressFetcher::new(storage.clone()),
        config.max_concurrent_fetches,
        task_tx,
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let picker = Picker::from_query_stdio().ok();
    let mut app = App::new(store, SlotBinder::new(loader), picker);

    let res = run_app(&mut terminal, &mut app, &mut task_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("{err}");
        eprintln!("{err}");
    }
    Ok(())
}

/// Log lines would corrupt the alternate screen, so they go to a file.
fn init_logging(config: &Config) -> io::Result<()> {
    if let Some(parent) = config.log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    task_rx: &mut mpsc::UnboundedReceiver<LoadEvent>,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();

    loop {
        let size = terminal.size()?;
        app.set_viewport(rows_for_height(size.height));
        app.refresh_if_needed();
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            // Handle keyboard events
            Some(Ok(event)) = event_stream.next() => {
                if let Event::Key(key) = event {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if key.code == KeyCode::Char('q') {
                        return Ok(());
                    }
                    handle_input(app, key.code);
                }
            }

            // Handle fetch results
            Some(event) = task_rx.recv() => {
                app.handle_load(event);
            }

            else => return Ok(()),
        }
    }
}

fn handle_input(app: &mut App, key: KeyCode) {
    let page = app.visible_rows.max(1) as isize;
    match key {
        KeyCode::Up => app.move_cursor(-1),
        KeyCode::Down => app.move_cursor(1),
        KeyCode::PageUp => app.move_cursor(-page),
        KeyCode::PageDown => app.move_cursor(page),
        KeyCode::Home => app.move_cursor(isize::MIN),
        KeyCode::End => app.move_cursor(isize::MAX),
        KeyCode::Char(' ') => app.toggle_checked(),
        KeyCode::Char('d') => app.toggle_drag(),
        KeyCode::Char('u') => app.uncheck_all(),
        _ => {}
    }
}

mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing::{debug, info};
use typetest::{
    config::{next_duration, normalize_duration, parse_duration, Config, ConfigStore, FileConfigStore},
    logging,
    passages::PassagePool,
    runtime::{AppEvent, CrosstermEventSource, EventSource, Runner, TickId, TimeSource},
    session::{Phase, SessionConfig, TypingSession},
    store::{FileScoreStore, ScoreStore},
};

const POLL_INTERVAL_MS: u64 = 250;

/// timed typing speed test with live wpm, accuracy and a best score
#[derive(Parser, Debug, Clone, Default)]
#[clap(
    version,
    about,
    long_about = "Type the paragraph shown before the clock runs out. Words per minute counts correct characters (five per word) over the configured duration; your best score is kept between runs."
)]
pub struct Cli {
    /// number of seconds to run the test: 15, 30, 60 or 120 (anything else means 60)
    #[clap(short = 's', long)]
    secs: Option<String>,

    /// custom reference text to type instead of the builtin paragraphs
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    /// read settings from this config file instead of the default location
    #[clap(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command line wins over the config file
    fn duration_secs(&self, config: &Config) -> u64 {
        match self.secs {
            Some(ref raw) => parse_duration(raw),
            None => normalize_duration(config.duration_secs),
        }
    }

    fn passage_pool(&self, config: &Config) -> PassagePool {
        match self.prompt {
            Some(ref prompt) => PassagePool::single(prompt.clone()),
            None => PassagePool::new(config.passages.clone()),
        }
    }

    fn load_config(&self) -> Config {
        match self.config {
            Some(ref path) => FileConfigStore::with_path(path).load(),
            None => FileConfigStore::new().load(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitType {
    Continue,
    Quit,
}

#[derive(Debug)]
pub struct App<S: ScoreStore, T: TimeSource> {
    pub session: TypingSession<S, T>,
    /// mirror of what the user has typed, fed to the session whole
    pub input: String,
}

impl<S: ScoreStore, T: TimeSource> App<S, T> {
    pub fn new(cli: &Cli, config: &Config, store: S, time: T) -> Self {
        let session = TypingSession::new(
            SessionConfig::new(cli.duration_secs(config)),
            cli.passage_pool(config),
            store,
            time,
        );

        Self {
            session,
            input: String::new(),
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> ExitType {
        if key.kind != KeyEventKind::Press {
            return ExitType::Continue;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return ExitType::Quit,
            KeyCode::Char('c') if ctrl => return ExitType::Quit,
            KeyCode::Char('r') if ctrl => self.reset(),
            KeyCode::Left => self.reset(),
            KeyCode::Enter => match self.session.phase() {
                Phase::Idle if !self.session.is_armed() => self.start(),
                Phase::Finished => {
                    self.session.reset();
                    self.start();
                }
                _ => {}
            },
            KeyCode::Tab => {
                if self.session.phase() != Phase::Running {
                    let secs = next_duration(self.session.config().duration_secs);
                    debug!(secs, "duration changed");
                    self.session.configure(secs);
                    self.input.clear();
                }
            }
            KeyCode::Backspace => {
                if self.session.accepts_input() && self.input.pop().is_some() {
                    self.session.handle_input(&self.input);
                }
            }
            KeyCode::Char(c) if !ctrl => {
                if self.session.accepts_input() {
                    self.input.push(c);
                    self.session.handle_input(&self.input);
                }
            }
            _ => {}
        }

        ExitType::Continue
    }

    /// Ticks from a timer the session no longer owns are dropped
    pub fn on_tick(&mut self, id: TickId) {
        if self.session.owns_tick(id) {
            self.session.tick();
        }
    }

    fn start(&mut self) {
        self.input.clear();
        self.session.start();
    }

    fn reset(&mut self) {
        self.input.clear();
        self.session.reset();
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    logging::init();
    let config = cli.load_config();

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new();
    let time = events.time_source();
    let runner = Runner::new(events, Duration::from_millis(POLL_INTERVAL_MS));

    let mut app = App::new(&cli, &config, FileScoreStore::new(), time);
    info!(
        duration_secs = app.session.config().duration_secs,
        best_wpm = app.session.best_wpm(),
        "starting"
    );
    let res = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn start_tui<B: Backend, S: ScoreStore, T: TimeSource, E: EventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S, T>,
    runner: &Runner<E>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;

    loop {
        let Some(event) = runner.step() else {
            continue;
        };

        match event {
            AppEvent::Tick(id) => app.on_tick(id),
            AppEvent::Resize => {}
            AppEvent::Key(key) => {
                if app.on_key(key) == ExitType::Quit {
                    break;
                }
            }
        }

        terminal.draw(|f| ui(app, f))?;
    }

    Ok(())
}

fn ui<S: ScoreStore, T: TimeSource>(app: &App<S, T>, f: &mut Frame) {
    f.render_widget(app, f.area());
}

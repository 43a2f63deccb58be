mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use lapclock::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{ConfigStore, FileConfigStore},
    error::TimerError,
    logging::init_logging,
    persistence::{BlobStore, SqliteBlobStore},
    runtime::{ChannelEventSource, EventSource, Runner, TimerEvent},
    scheduler::{Scheduler, TickScheduler},
    session::Session,
    settings::{DurationFields, SettingsForm, SettingsInput},
    timer::LifecycleState,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing::{debug, info, warn};

/// countdown timer with laps and a per-lap threshold
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal countdown timer that splits laps, highlights laps running past a threshold, and resumes where it left off after a restart."
)]
pub struct Cli {
    /// countdown target as HH:MM:SS
    #[clap(short = 't', long, value_parser = DurationFields::parse_target)]
    target: Option<DurationFields>,

    /// per-lap threshold as HH:MM:SS; with --target the run starts immediately
    #[clap(short = 'T', long, value_parser = DurationFields::parse_threshold)]
    threshold: Option<DurationFields>,

    /// refresh interval in milliseconds (defaults to the config file value)
    #[clap(long)]
    tick_ms: Option<u64>,

    /// ignore any saved session
    #[clap(long)]
    fresh: bool,

    /// path of the state database
    #[clap(long)]
    state_db: Option<PathBuf>,

    /// path of the log file
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Settings given on the command line, if both durations are present.
    fn start_input(&self) -> Option<SettingsInput> {
        match (self.target, self.threshold) {
            (Some(target), Some(threshold)) => Some(SettingsInput::from_fields(target, threshold)),
            _ => None,
        }
    }

    /// Partial settings used to pre-fill the form.
    fn prefill(&self, base: SettingsInput) -> SettingsInput {
        let target = self.target.unwrap_or(base.target());
        let threshold = self.threshold.unwrap_or(base.threshold());
        SettingsInput::from_fields(target, threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Settings,
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
pub struct App<C: Clock, S: Scheduler, B: BlobStore> {
    pub session: Session<C, S, B>,
    pub form: SettingsForm,
    /// Blocking message; the next key press dismisses it.
    pub alert: Option<String>,
    config_store: Option<FileConfigStore>,
}

impl<C: Clock, S: Scheduler, B: BlobStore> App<C, S, B> {
    pub fn new(
        session: Session<C, S, B>,
        last_settings: Option<SettingsInput>,
        config_store: Option<FileConfigStore>,
    ) -> Self {
        let input = session
            .timer()
            .settings()
            .map(SettingsInput::from_settings)
            .or(last_settings)
            .unwrap_or_default();
        Self {
            session,
            form: SettingsForm::new(input),
            alert: None,
            config_store,
        }
    }

    pub fn screen(&self) -> Screen {
        if self.session.timer().state().is_active() {
            Screen::Clock
        } else {
            Screen::Settings
        }
    }

    pub fn on_tick(&mut self) -> bool {
        self.session.tick()
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Flow {
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if ctrl_c || key.code == KeyCode::Esc {
            return Flow::Quit;
        }

        if self.alert.take().is_some() {
            return Flow::Continue;
        }

        match self.screen() {
            Screen::Settings => self.on_settings_key(key),
            Screen::Clock => self.on_clock_key(key),
        }
        Flow::Continue
    }

    fn on_settings_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab | KeyCode::Right | KeyCode::Down => self.form.focus_next(),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Up => self.form.focus_prev(),
            KeyCode::Backspace => self.form.backspace(),
            KeyCode::Enter => self.start_from_form(),
            KeyCode::Char(c) if c.is_ascii_digit() => self.form.type_char(c),
            _ => {}
        }
    }

    fn on_clock_key(&mut self, key: KeyEvent) {
        let result = match key.code {
            KeyCode::Char('p') => self.session.toggle().map(|action| {
                debug!(?action, "toggle");
            }),
            KeyCode::Char(' ') => self.session.split().map(|_| ()),
            KeyCode::Backspace => {
                self.session.undo();
                Ok(())
            }
            KeyCode::Char('r') => self.session.reset(),
            KeyCode::Char('b') => self.back_to_settings(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            debug!(error = %err, "ignored key");
        }
    }

    fn back_to_settings(&mut self) -> Result<(), TimerError> {
        let prefill = self
            .session
            .timer()
            .settings()
            .map(SettingsInput::from_settings);
        self.session.change_settings()?;
        if let Some(input) = prefill {
            self.form = SettingsForm::new(input);
        }
        Ok(())
    }

    /// Validate the form and begin a run. Validation failures become the alert.
    pub fn start_from_form(&mut self) {
        match self.form.submit() {
            Ok(settings) => match self.session.start(settings) {
                Ok(()) => self.remember(*self.form.input()),
                Err(err) => debug!(error = %err, "start ignored"),
            },
            Err(err) => self.alert = Some(err.to_string()),
        }
    }

    /// Begin a run straight from command-line settings.
    pub fn start_with(&mut self, input: SettingsInput) {
        self.form = SettingsForm::new(input);
        self.start_from_form();
    }

    fn remember(&self, input: SettingsInput) {
        let Some(store) = &self.config_store else {
            return;
        };
        let mut cfg = store.load();
        cfg.last_settings = Some(input);
        if let Err(err) = store.save(&cfg) {
            warn!(error = %err, path = %store.path().display(), "failed to save config");
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _log_guard = cli
        .log_file
        .clone()
        .or_else(AppDirs::log_path)
        .and_then(|path| init_logging(&path));

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();
    if let Some(ms) = cli.tick_ms {
        config.tick_rate_ms = ms;
    }
    let tick = Duration::from_millis(config.tick_rate_ms());

    let db_path = cli
        .state_db
        .clone()
        .or_else(AppDirs::db_path)
        .ok_or("could not resolve a state directory")?;
    let blobs = SqliteBlobStore::open(&db_path)?;
    info!(db = %db_path.display(), tick_ms = tick.as_millis() as u64, "starting");

    let start_input = cli.start_input();
    let session = if cli.fresh || start_input.is_some() {
        Session::fresh(SystemClock, TickScheduler::new(), blobs, tick)
    } else {
        Session::open(SystemClock, TickScheduler::new(), blobs, tick)
    };

    let mut app = App::new(session, config.last_settings, Some(config_store));
    match start_input {
        Some(input) => app.start_with(input),
        None if app.session.timer().state() == LifecycleState::NotStarted => {
            app.form = SettingsForm::new(cli.prefill(*app.form.input()));
        }
        None => {}
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(ChannelEventSource::terminal(), tick);
    let result = run_app(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app<T, C, S, B, E>(
    terminal: &mut Terminal<T>,
    app: &mut App<C, S, B>,
    runner: &Runner<E>,
) -> Result<(), Box<dyn Error>>
where
    T: Backend,
    C: Clock,
    S: Scheduler,
    B: BlobStore,
    E: EventSource,
{
    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    loop {
        let redraw = match runner.step() {
            TimerEvent::Tick => app.on_tick(),
            TimerEvent::Resize => true,
            TimerEvent::InputClosed => {
                warn!("terminal input closed");
                break;
            }
            TimerEvent::Key(key) => {
                if app.on_key(key) == Flow::Quit {
                    break;
                }
                true
            }
        };
        if redraw {
            terminal.draw(|f| f.render_widget(&*app, f.area()))?;
        }
    }

    info!(state = %app.session.timer().state(), "exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapclock::{
        clock::ManualClock,
        config::Config,
        persistence::MemoryBlobStore,
        runtime::ChannelEventSource,
        settings::SettingsField,
    };
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;
    use tempfile::tempdir;

    const T0: i64 = 1_700_000_000_000;
    const TICK: Duration = Duration::from_millis(100);

    type TestApp = App<ManualClock, TickScheduler, MemoryBlobStore>;

    fn test_app(clock: &ManualClock) -> TestApp {
        let session = Session::fresh(
            clock.clone(),
            TickScheduler::new(),
            MemoryBlobStore::new(),
            TICK,
        );
        App::new(session, None, None)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_digits(app: &mut TestApp, digits: &str) {
        for c in digits.chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
    }

    /// Fill the form with 00:02:10 / 00:00:10 via the keyboard.
    fn fill_form(app: &mut TestApp) {
        for text in ["", "02", "10", "", "", "10"] {
            app.on_key(key(KeyCode::Backspace));
            app.on_key(key(KeyCode::Backspace));
            type_digits(app, text);
            app.on_key(key(KeyCode::Tab));
        }
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["lapclock"]);
        assert_eq!(cli.target, None);
        assert_eq!(cli.threshold, None);
        assert_eq!(cli.tick_ms, None);
        assert!(!cli.fresh);
        assert!(cli.start_input().is_none());
    }

    #[test]
    fn test_cli_durations() {
        let cli = Cli::parse_from(["lapclock", "--target", "00:02:10", "-T", "00:00:10"]);
        assert_eq!(cli.target, Some(DurationFields::new(0, 2, 10)));
        let input = cli.start_input().unwrap();
        assert_eq!(input.target_minutes, 2);
        assert_eq!(input.threshold_seconds, 10);
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["lapclock", "--target", "24:00:00"]).is_err());
        assert!(Cli::try_parse_from(["lapclock", "--target", "10"]).is_err());
    }

    #[test]
    fn test_cli_threshold_error_names_threshold() {
        let err = Cli::try_parse_from(["lapclock", "--threshold", "00:99:00"]).unwrap_err();
        assert!(err.to_string().contains("between 0 and 59"));
        assert!(err.to_string().contains("--threshold"));
        assert_eq!(
            DurationFields::parse_threshold("00:99:00").unwrap_err().field(),
            Some(SettingsField::ThresholdMinutes)
        );
    }

    #[test]
    fn test_cli_prefill_keeps_missing_half() {
        let cli = Cli::parse_from(["lapclock", "--target", "01:00:00"]);
        let base = SettingsInput {
            threshold_minutes: 3,
            ..Default::default()
        };
        let input = cli.prefill(base);
        assert_eq!(input.target_hours, 1);
        assert_eq!(input.threshold_minutes, 3);
    }

    #[test]
    fn test_start_from_keyboard() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        assert_eq!(app.screen(), Screen::Settings);

        fill_form(&mut app);
        app.on_key(key(KeyCode::Enter));

        assert_eq!(app.screen(), Screen::Clock);
        assert_eq!(app.session.timer().state(), LifecycleState::Running);
        assert_eq!(app.session.timer().display(), "00:02:10.0");
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_missing_threshold_raises_alert() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        app.form.set_text(SettingsField::TargetSeconds, "30").unwrap();
        app.on_key(key(KeyCode::Enter));

        assert_eq!(app.alert.as_deref(), Some("Please enter a Threshold value"));
        assert_eq!(app.screen(), Screen::Settings);

        // any key dismisses the alert without acting
        app.on_key(key(KeyCode::Char('5')));
        assert!(app.alert.is_none());
        assert_eq!(app.form.text(SettingsField::TargetHours), "00");
    }

    #[test]
    fn test_non_digits_are_ignored_in_form() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        app.on_key(key(KeyCode::Backspace));
        app.on_key(key(KeyCode::Backspace));
        app.on_key(key(KeyCode::Char('x')));
        assert_eq!(app.form.text(SettingsField::TargetHours), "");
        assert!(app.form.target_error().is_none());

        type_digits(&mut app, "99");
        assert_eq!(
            app.form.target_error(),
            Some("Please enter a value between 0 and 23")
        );
    }

    #[test]
    fn test_clock_keys_drive_timer() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        app.start_with(SettingsInput {
            target_minutes: 1,
            threshold_seconds: 5,
            ..Default::default()
        });

        clock.advance(2_000);
        app.on_key(key(KeyCode::Char(' ')));
        assert_eq!(app.session.timer().laps().len(), 1);

        app.on_key(key(KeyCode::Char('p')));
        assert_eq!(app.session.timer().state(), LifecycleState::Paused);
        // split is ignored while paused
        app.on_key(key(KeyCode::Char(' ')));
        assert_eq!(app.session.timer().laps().len(), 1);

        app.on_key(key(KeyCode::Backspace));
        assert!(app.session.timer().laps().is_empty());

        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(app.session.timer().state(), LifecycleState::Reset);
        app.on_key(key(KeyCode::Char('p')));
        assert_eq!(app.session.timer().state(), LifecycleState::Running);
    }

    #[test]
    fn test_back_to_settings_prefills_form() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        app.start_with(SettingsInput {
            target_minutes: 2,
            target_seconds: 10,
            threshold_seconds: 10,
            ..Default::default()
        });

        app.on_key(key(KeyCode::Char('b')));
        assert_eq!(app.screen(), Screen::Settings);
        assert_eq!(app.session.timer().state(), LifecycleState::Settings);
        assert_eq!(app.form.text(SettingsField::TargetMinutes), "02");
        assert_eq!(app.form.text(SettingsField::ThresholdSeconds), "10");
    }

    #[test]
    fn test_quit_keys() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        assert_eq!(app.on_key(key(KeyCode::Esc)), Flow::Quit);
        assert_eq!(
            app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Flow::Quit
        );
        assert_eq!(app.on_key(key(KeyCode::Tab)), Flow::Continue);
    }

    #[test]
    fn test_start_remembers_settings() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let clock = ManualClock::new(T0);
        let session = Session::fresh(clock, TickScheduler::new(), MemoryBlobStore::new(), TICK);
        let mut app: TestApp = App::new(session, None, Some(store.clone()));

        let input = SettingsInput {
            target_minutes: 5,
            threshold_minutes: 1,
            ..Default::default()
        };
        app.start_with(input);

        let cfg = store.load();
        assert_eq!(cfg.last_settings, Some(input));
        assert_eq!(cfg.tick_rate_ms, Config::default().tick_rate_ms);
    }

    #[test]
    fn test_last_settings_prefill_new_app() {
        let clock = ManualClock::new(T0);
        let session = Session::fresh(clock, TickScheduler::new(), MemoryBlobStore::new(), TICK);
        let last = SettingsInput {
            target_hours: 1,
            threshold_minutes: 15,
            ..Default::default()
        };
        let app: TestApp = App::new(session, Some(last), None);
        assert_eq!(app.form.text(SettingsField::TargetHours), "01");
        assert_eq!(app.form.text(SettingsField::ThresholdMinutes), "15");
    }

    #[test]
    fn test_run_app_stops_when_input_closes() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        let (tx, rx) = mpsc::channel();
        tx.send(TimerEvent::Tick).unwrap();
        drop(tx);
        let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(5));

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        run_app(&mut terminal, &mut app, &runner).unwrap();
        assert_eq!(app.session.timer().state(), LifecycleState::NotStarted);
    }

    #[test]
    fn test_run_app_quits_on_esc() {
        let clock = ManualClock::new(T0);
        let mut app = test_app(&clock);
        app.start_with(SettingsInput {
            target_seconds: 30,
            threshold_seconds: 5,
            ..Default::default()
        });

        let (tx, rx) = mpsc::channel();
        tx.send(TimerEvent::Tick).unwrap();
        tx.send(TimerEvent::Key(key(KeyCode::Char(' ')))).unwrap();
        tx.send(TimerEvent::Resize).unwrap();
        tx.send(TimerEvent::Key(key(KeyCode::Esc))).unwrap();
        let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(5));

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        run_app(&mut terminal, &mut app, &runner).unwrap();

        assert_eq!(app.session.timer().laps().len(), 1);
        let content: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(content.contains("00:00:30.0"));
    }
}

use std::{
    io::{self, Stdout},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, info, warn};
use ratatui::Terminal;

use crate::{
    app::App,
    command::{Dispatcher, Message},
    config::AppConfig,
    rpc::{Daemon, TransmissionClient},
};

type Backend = ratatui::backend::CrosstermBackend<Stdout>;

const WORKER_COUNT: usize = 4;
const TICK_RATE: Duration = Duration::from_millis(250);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub fn run(config: AppConfig) -> Result<()> {
    let client = TransmissionClient::new(config.rpc.clone(), config.move_data)
        .context("failed to construct Transmission RPC client")?;
    let rpc_version = client
        .check_version()
        .with_context(|| format!("cannot talk to {}", config.rpc.endpoint()))?;
    info!("connected to {} (rpc version {rpc_version})", config.rpc.endpoint());
    let daemon: Arc<dyn Daemon> = Arc::new(client);

    let mut terminal = setup_terminal()?;
    let (event_tx, event_rx) = unbounded();

    let input_handle = spawn_input_thread(event_tx.clone());
    let dispatcher = Dispatcher::spawn(daemon, event_tx.clone(), WORKER_COUNT);
    drop(event_tx);

    let mut app = App::new(&config);
    let loop_result = terminal
        .size()
        .context("failed to query terminal size")
        .and_then(|area| {
            let initial = Message::Resize {
                width: area.width,
                height: area.height,
            };
            run_loop(&mut terminal, &mut app, initial, event_rx, &dispatcher)
        });

    restore_terminal(&mut terminal)?;
    dispatcher.shutdown(SHUTDOWN_GRACE);
    input_handle.join().ok();

    loop_result
}

fn run_loop(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    initial: Message,
    events: Receiver<Message>,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let mut next = Some(initial);
    loop {
        let message = match next.take() {
            Some(message) => message,
            None => match events.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };
        let commands = app.handle(message);
        if let Some(err) = app.fatal_error() {
            bail!("daemon request failed: {err}");
        }
        for command in commands {
            dispatcher.submit(command)?;
        }
        if app.should_quit() {
            break;
        }
        terminal.draw(|f| app.render(f))?;
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(tx: Sender<Message>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        let message = match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => match translate(evt) {
                    Some(message) => message,
                    None => continue,
                },
                Err(err) => {
                    warn!("failed to read terminal event: {err}");
                    continue;
                }
            },
            Ok(false) => Message::Tick,
            Err(err) => {
                warn!("failed to poll terminal events: {err}");
                Message::Tick
            }
        };
        if tx.send(message).is_err() {
            debug!("input thread stopped");
            break;
        }
    })
}

fn translate(evt: Event) -> Option<Message> {
    match evt {
        Event::Key(key) => Some(Message::Key(key)),
        Event::Resize(width, height) => Some(Message::Resize { width, height }),
        Event::Paste(text) => Some(Message::Paste(text)),
        _ => None,
    }
}

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::Mutex;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop` waits for the keyboard task to restore the terminal
const KEYBOARD_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Exit status used when a repeated Ctrl+C ends the process
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// `q` or `Esc`: end the current preview or capture
    Quit,
    /// Ctrl+C typed while the terminal is in raw mode
    Abort,
}

/// Map a key press to the action it requests
pub fn key_action(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyAction> {
    match code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(KeyAction::Abort),
        _ => None,
    }
}

/// What a Ctrl+C signal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// The current target was cancelled
    Cancelled,
    /// The target was already cancelled; the process should exit
    Exit,
}

/// Apply one Ctrl+C to the current target
pub(crate) fn route_ctrl_c(target: &Mutex<CancellationToken>) -> SignalAction {
    let target = target.lock();
    if target.is_cancelled() {
        SignalAction::Exit
    } else {
        target.cancel();
        SignalAction::Cancelled
    }
}

/// Routes Ctrl+C signals to the token of the current run phase.
///
/// A Ctrl+C arriving while that token is already cancelled exits the process
/// with [`INTERRUPTED_EXIT_CODE`]. The signal handler is removed on drop.
pub struct SignalRouter {
    target: Arc<Mutex<CancellationToken>>,
    task: JoinHandle<()>,
}

impl SignalRouter {
    pub fn start(target: CancellationToken) -> Self {
        let target = Arc::new(Mutex::new(target));
        let routed = Arc::clone(&target);

        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }

                info!("Received SIGINT signal (Ctrl+C)");
                if route_ctrl_c(&routed) == SignalAction::Exit {
                    warn!("Ctrl+C received again, exiting");
                    let _ = disable_raw_mode();
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });

        Self { target, task }
    }

    /// Send later signals to `target` instead
    pub fn retarget(&self, target: CancellationToken) {
        *self.target.lock() = target;
    }
}

impl Drop for SignalRouter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watches the terminal for `q`, `Esc` and raw-mode Ctrl+C.
///
/// `q`/`Esc` cancel the quit token. Ctrl+C cancels the abort token. Does
/// nothing when stdin is not a terminal.
pub struct KeyListener {
    stop_token: CancellationToken,
    keyboard_task: Option<JoinHandle<()>>,
}

impl KeyListener {
    pub fn start(quit: CancellationToken, abort: CancellationToken) -> Self {
        let stop_token = CancellationToken::new();

        let keyboard_task = if std::io::stdin().is_terminal() {
            Some(spawn_keyboard_listener(quit, abort, stop_token.clone()))
        } else {
            debug!("stdin is not a terminal, keyboard interrupts disabled");
            None
        };

        Self {
            stop_token,
            keyboard_task,
        }
    }

    /// Stop listening and give the terminal back
    pub async fn stop(self) {
        self.stop_token.cancel();

        if let Some(keyboard_task) = self.keyboard_task {
            if tokio::time::timeout(KEYBOARD_SHUTDOWN_TIMEOUT, keyboard_task)
                .await
                .is_err()
            {
                warn!("Keyboard listener did not stop in time");
            }
        }

        // Raw mode must be off before any console prompt
        let _ = disable_raw_mode();
    }
}

fn spawn_keyboard_listener(
    quit: CancellationToken,
    abort: CancellationToken,
    stop: CancellationToken,
) -> JoinHandle<()> {
    task::spawn_blocking(move || {
        if let Err(e) = enable_raw_mode() {
            error!("Failed to enable raw mode for keyboard input: {}", e);
            return;
        }

        while !stop.is_cancelled() && !quit.is_cancelled() && !abort.is_cancelled() {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key_event)) = event::read() {
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key_action(key_event.code, key_event.modifiers) {
                            Some(KeyAction::Quit) => {
                                info!("Quit key pressed");
                                quit.cancel();
                                break;
                            }
                            Some(KeyAction::Abort) => {
                                info!("Ctrl+C pressed");
                                abort.cancel();
                                break;
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Error polling for keyboard events: {}", e),
            }
        }

        if let Err(e) = disable_raw_mode() {
            error!("Failed to disable raw mode: {}", e);
        } else {
            debug!("Raw mode disabled");
        }
    })
}

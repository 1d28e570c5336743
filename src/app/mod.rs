//! Run lifecycle: validation, device selection, the capture worker,
//! interrupts and the assembly decision.

mod controller;
mod handle;
mod interrupt;
mod prompt;
mod worker;


pub use controller::{RunController, RunControllerBuilder};
pub use handle::CaptureHandle;
pub use interrupt::{key_action, KeyAction, KeyListener, SignalAction, SignalRouter, INTERRUPTED_EXIT_CODE};
pub use prompt::{parse_choice, parse_yes_no, AssemblyPrompt, CameraSelector, ConsolePrompt};
pub use worker::{CaptureReport, FALLBACK_VIDEO_RESOLUTION};

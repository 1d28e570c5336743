use crate::error::{Result, TimelapseError};
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};

/// Decides whether stored frames should become a video after an interrupt
pub trait AssemblyPrompt: Send + Sync {
    fn confirm_assembly(&self) -> Result<bool>;
}

/// Picks one camera out of several probed candidates
pub trait CameraSelector: Send + Sync {
    fn select_from(&self, candidates: &[u32]) -> Result<u32>;
}

/// Interactive prompt on a line-based console.
///
/// Invalid answers are reported and asked again; end of input is an error.
pub struct ConsolePrompt {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl ConsolePrompt {
    /// Prompt on the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::with_io(BufReader::new(io::stdin()), io::stdout())
    }

    pub fn with_io<R, W>(input: R, output: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
        }
    }

    fn say(&self, text: &str) -> Result<()> {
        let mut output = self.output.lock();
        output.write_all(text.as_bytes())?;
        output.flush()?;
        Ok(())
    }

    fn read_answer(&self) -> Result<String> {
        let mut line = String::new();
        if self.input.lock().read_line(&mut line)? == 0 {
            return Err(TimelapseError::system("Console input closed"));
        }
        Ok(line.trim().to_string())
    }
}

impl AssemblyPrompt for ConsolePrompt {
    fn confirm_assembly(&self) -> Result<bool> {
        loop {
            self.say("Generate video from captures? [y/n]: ")?;
            match parse_yes_no(&self.read_answer()?) {
                Some(answer) => return Ok(answer),
                None => self.say("Please answer y or n.\n")?,
            }
        }
    }
}

impl CameraSelector for ConsolePrompt {
    fn select_from(&self, candidates: &[u32]) -> Result<u32> {
        let mut listing = String::from("Available cameras:\n");
        for (position, index) in candidates.iter().enumerate() {
            listing.push_str(&format!("  {}) /dev/video{}\n", position + 1, index));
        }
        self.say(&listing)?;

        loop {
            self.say(&format!("Select camera [1-{}]: ", candidates.len()))?;
            match parse_choice(&self.read_answer()?, candidates) {
                Some(index) => return Ok(index),
                None => self.say("Invalid selection.\n")?,
            }
        }
    }
}

/// Map a 1-based menu answer onto a candidate device index
pub fn parse_choice(answer: &str, candidates: &[u32]) -> Option<u32> {
    let position: usize = answer.trim().parse().ok()?;
    position
        .checked_sub(1)
        .and_then(|i| candidates.get(i))
        .copied()
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

use std::io::{BufRead, Write};

use tracing::debug;

use crate::trace::DecodeConfig;
use crate::{JudgeError, JudgeResult};

/// Decode bit lines from `input`, writing one trace line per event to
/// `output`. Blank lines are skipped. Returns the number of events.
pub fn run<R: BufRead, W: Write>(config: &DecodeConfig, input: R, mut output: W) -> JudgeResult<usize> {
    config.validate()?;
    let stdio = |e| JudgeError::io("<stdio>", e);
    let mut events = 0;
    for line in input.lines() {
        let line = line.map_err(stdio)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match config.decode(line)? {
            Some(event) => {
                writeln!(output, "{}", event.render(config.register_padding)).map_err(stdio)?;
                events += 1;
            }
            None => debug!(line, "no event"),
        }
    }
    output.flush().map_err(stdio)?;
    Ok(events)
}

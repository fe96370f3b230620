//! Assembled program images.
//!
//! The reference generator dumps `.text` as one hex word per line. Before a
//! candidate runs, the image may get an appendix (by default an infinite loop,
//! so a design without halt detection spins in place) and is then either
//! copied to where a testbench reads it or patched into a circuit's ROM.

pub mod patcher;

use std::io::Write;
use std::path::Path;

use crate::{JudgeError, JudgeResult};

pub use patcher::{PatchedCircuit, RomContents, patch_circuit, read_rom_contents};

/// `beq $0, $0, -1` followed by a `nop` delay slot.
pub const INFINITE_LOOP: &[u32] = &[0x1000_ffff, 0x0000_0000];

/// Parse one line of hex dump text into an instruction word.
///
/// Lines with anything other than hex digits, or with a value wider than
/// 32 bits, are not instructions.
pub fn parse_instruction(line: &str) -> Option<u32> {
    if line.is_empty() || !line.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(line, 16).ok()
}

/// Ordered instruction words of an assembled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    words: Vec<u32>,
}

impl ProgramImage {
    pub fn parse(text: &str) -> Self {
        let words = text.lines().filter_map(|l| parse_instruction(l.trim())).collect();
        ProgramImage { words }
    }

    pub fn from_words(words: Vec<u32>) -> Self {
        ProgramImage { words }
    }

    pub fn from_file(path: &Path) -> JudgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| JudgeError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words without trailing zero fill.
    pub fn trimmed(&self) -> &[u32] {
        let end = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.words[..end]
    }

    /// Render as the reference generator's hex text format.
    pub fn to_hex_text(&self) -> String {
        let mut s = String::with_capacity(self.words.len() * 9);
        for w in &self.words {
            s.push_str(&format!("{w:08x}\n"));
        }
        s
    }
}

/// Append extra words to a hex dump file in place.
pub fn append_words(path: &Path, words: &[u32]) -> JudgeResult<()> {
    if words.is_empty() {
        return Ok(());
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| JudgeError::io(path, e))?;
    let mut text = String::from("\n");
    for w in words {
        text.push_str(&format!("{w:08x}\n"));
    }
    file.write_all(text.as_bytes()).map_err(|e| JudgeError::io(path, e))
}

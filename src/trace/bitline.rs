use crate::{JudgeError, JudgeResult};

/// Byte stride applied to fields that count words instead of bytes.
pub const WORD_BYTES: u64 = 4;

/// A line of `0`/`1` characters read front to back.
#[derive(Debug, Clone)]
pub struct BitLine {
    bits: Vec<u8>,
    raw: String,
    cursor: usize,
}

impl BitLine {
    /// Whitespace anywhere in the line is ignored; anything else that is not a
    /// binary digit is rejected.
    pub fn new(line: &str) -> JudgeResult<Self> {
        let mut bits = Vec::with_capacity(line.len());
        for ch in line.chars().filter(|c| !c.is_whitespace()) {
            match ch {
                '0' => bits.push(0),
                '1' => bits.push(1),
                other => {
                    return Err(JudgeError::Decode {
                        line: line.to_string(),
                        reason: format!("found {other}"),
                    });
                }
            }
        }
        Ok(BitLine { bits, raw: line.to_string(), cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.cursor
    }

    /// Consume the next `n` bits, most significant first.
    pub fn take(&mut self, n: u32, by_word: bool) -> JudgeResult<u64> {
        if n > 64 {
            return Err(self.error(format!("field of {n} bits does not fit in 64")));
        }
        let n = n as usize;
        if self.remaining() < n {
            return Err(self.error(format!(
                "line too short, needed {n} more bits at offset {}",
                self.cursor
            )));
        }
        let value = self.bits[self.cursor..self.cursor + n]
            .iter()
            .fold(0u64, |acc, b| (acc << 1) | u64::from(*b));
        self.cursor += n;
        if by_word {
            value
                .checked_mul(WORD_BYTES)
                .ok_or_else(|| self.error("word address overflows 64 bits".into()))
        } else {
            Ok(value)
        }
    }

    pub fn take_bit(&mut self) -> JudgeResult<bool> {
        Ok(self.take(1, false)? == 1)
    }

    pub fn error(&self, reason: String) -> JudgeError {
        JudgeError::Decode { line: self.raw.clone(), reason }
    }
}

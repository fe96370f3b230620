use serde::{Deserialize, Serialize};

use crate::{JudgeError, JudgeResult};

use super::bitline::BitLine;
use super::event::{LOAD_ORIGIN, RegisterPadding, TraceEvent};

/// Turns one line of tool output into an optional trace line.
///
/// `Ok(None)` means the line carries no architectural event (diagnostics,
/// headers, cycles without writes). An `Err` aborts the tool run.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> JudgeResult<Option<String>>;
}

impl<F> LineClassifier for F
where
    F: Fn(&str) -> JudgeResult<Option<String>> + Send + Sync,
{
    fn classify(&self, line: &str) -> JudgeResult<Option<String>> {
        self(line)
    }
}

/// Classifier for the reference generator's console output.
#[derive(Debug, Clone)]
pub struct ReferenceClassifier {
    pub tool: String,
}

impl Default for ReferenceClassifier {
    fn default() -> Self {
        ReferenceClassifier { tool: "MARS".to_string() }
    }
}

impl LineClassifier for ReferenceClassifier {
    fn classify(&self, line: &str) -> JudgeResult<Option<String>> {
        let lower = line.to_lowercase();
        if lower.contains("error") {
            return Err(JudgeError::ToolReported {
                tool: self.tool.clone(),
                message: line.to_string(),
            });
        }
        if lower.contains("nothing to dump") {
            return Err(JudgeError::SegmentNotFound {
                tool: self.tool.clone(),
                message: lower,
            });
        }
        // writes to $0 are not observable
        if line.contains("$ 0 ") || line.contains("$00 ") {
            return Ok(None);
        }
        if line.starts_with('@') {
            return Ok(Some(line.to_string()));
        }
        Ok(None)
    }
}

/// Classifier for testbench executables that print trace text themselves.
#[derive(Debug, Clone)]
pub struct TestbenchClassifier {
    pub tool: String,
}

impl LineClassifier for TestbenchClassifier {
    fn classify(&self, line: &str) -> JudgeResult<Option<String>> {
        if line.to_lowercase().contains("error") {
            return Err(JudgeError::ToolReported {
                tool: self.tool.clone(),
                message: line.to_string(),
            });
        }
        if line.starts_with('@') {
            return Ok(Some(line.to_string()));
        }
        Ok(None)
    }
}

/// Field layout of a candidate circuit's output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Width of the PC field
    pub pc_width: u32,
    /// PC counts words rather than bytes
    pub pc_by_word: bool,
    /// PC value the circuit starts at; rebased onto the reference load origin
    pub pc_start: u64,
    /// Width of the memory write address field
    pub dma_width: u32,
    /// Memory write address counts words rather than bytes
    pub dma_by_word: bool,
    /// Register field rendering
    pub register_padding: RegisterPadding,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            pc_width: 32,
            pc_by_word: false,
            pc_start: 0,
            dma_width: 32,
            dma_by_word: false,
            register_padding: RegisterPadding::Zero,
        }
    }
}

impl DecodeConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        if self.pc_width == 0 || self.pc_width > 64 {
            return Err(JudgeError::Config(format!(
                "pc width must be within 1..=64, got {}",
                self.pc_width
            )));
        }
        if self.dma_width == 0 || self.dma_width > 64 {
            return Err(JudgeError::Config(format!(
                "memory address width must be within 1..=64, got {}",
                self.dma_width
            )));
        }
        Ok(())
    }

    /// Decode one bit line into the event it carries, if any.
    pub fn decode(&self, line: &str) -> JudgeResult<Option<TraceEvent>> {
        let mut bits = BitLine::new(line)?;

        let raw_pc = bits.take(self.pc_width, self.pc_by_word)?;
        let pc = LOAD_ORIGIN
            .checked_add(raw_pc)
            .and_then(|pc| pc.checked_sub(self.pc_start))
            .ok_or_else(|| bits.error(format!("pc {raw_pc:#x} is below start {:#x}", self.pc_start)))?;

        let reg_write = bits.take_bit()?;
        let reg_index = bits.take(5, false)? as u8;
        let reg_data = bits.take(32, false)? as u32;
        if reg_write && reg_index != 0 {
            return Ok(Some(TraceEvent::RegisterWrite { pc, reg_index, data: reg_data }));
        }

        if bits.take_bit()? {
            let address = bits.take(self.dma_width, self.dma_by_word)?;
            let data = bits.take(32, false)? as u32;
            return Ok(Some(TraceEvent::MemoryWrite { pc, address, data }));
        }
        Ok(None)
    }
}

/// Classifier for circuit simulators emitting one row of bits per cycle.
#[derive(Debug, Clone, Default)]
pub struct BitLineClassifier {
    pub config: DecodeConfig,
}

impl BitLineClassifier {
    pub fn new(config: DecodeConfig) -> Self {
        BitLineClassifier { config }
    }
}

impl LineClassifier for BitLineClassifier {
    fn classify(&self, line: &str) -> JudgeResult<Option<String>> {
        if line.is_empty() {
            return Ok(None);
        }
        Ok(self
            .config
            .decode(line)?
            .map(|ev| ev.render(self.config.register_padding)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(value: u64, width: usize) -> String {
        format!("{value:0width$b}")
    }

    fn row(pc: u64, we: bool, reg: u64, data: u64, mem: Option<(u64, u64)>) -> String {
        let mut s = bits(pc, 32);
        s.push(if we { '1' } else { '0' });
        s.push_str(&bits(reg, 5));
        s.push_str(&bits(data, 32));
        match mem {
            Some((addr, d)) => {
                s.push('1');
                s.push_str(&bits(addr, 32));
                s.push_str(&bits(d, 32));
            }
            None => s.push('0'),
        }
        s
    }

    #[test]
    fn test_reference_keeps_trace_lines() {
        let c = ReferenceClassifier::default();
        let line = "@00003000: $ 8 <= 0000000a";
        assert_eq!(c.classify(line).unwrap(), Some(line.to_string()));
        assert_eq!(c.classify("Program terminated").unwrap(), None);
    }

    #[test]
    fn test_reference_drops_register_zero() {
        let c = ReferenceClassifier::default();
        assert_eq!(c.classify("@00003000: $ 0 <= 00000001").unwrap(), None);
        assert_eq!(c.classify("@00003000: $00 <= 00000001").unwrap(), None);
    }

    #[test]
    fn test_reference_error_is_fatal() {
        let c = ReferenceClassifier::default();
        let err = c.classify("Assembly ERROR in line 3").unwrap_err();
        assert!(matches!(err, JudgeError::ToolReported { .. }));
    }

    #[test]
    fn test_reference_nothing_to_dump() {
        let c = ReferenceClassifier::default();
        let err = c.classify("Nothing to dump for segment 0x4180").unwrap_err();
        assert!(matches!(err, JudgeError::SegmentNotFound { .. }));
    }

    #[test]
    fn test_testbench_classifier() {
        let c = TestbenchClassifier { tool: "ISim".into() };
        assert!(c.classify("@00003000: *00000000 <= 00000001").unwrap().is_some());
        assert!(c.classify("Simulator is doing circuit initialization process.").unwrap().is_none());
        assert!(c.classify("ERROR: file not found").is_err());
    }

    #[test]
    fn test_decode_register_write() {
        let c = BitLineClassifier::default();
        let line = row(0, true, 8, 0xa, None);
        assert_eq!(c.classify(&line).unwrap().unwrap(), "@00003000: $08 <= 0000000a");
    }

    #[test]
    fn test_decode_register_zero_falls_through_to_memory() {
        let c = BitLineClassifier::default();
        let line = row(4, true, 0, 0xff, Some((0x10, 0x1234)));
        assert_eq!(c.classify(&line).unwrap().unwrap(), "@00003004: *00000010 <= 00001234");
    }

    #[test]
    fn test_decode_no_write() {
        let c = BitLineClassifier::default();
        assert_eq!(c.classify(&row(8, false, 3, 1, None)).unwrap(), None);
        assert_eq!(c.classify("").unwrap(), None);
    }

    #[test]
    fn test_decode_by_word_and_start() {
        let config = DecodeConfig {
            pc_width: 8,
            pc_by_word: true,
            pc_start: 0x3000,
            dma_width: 5,
            dma_by_word: true,
            register_padding: RegisterPadding::Space,
        };
        // pc = 2 words, mem write at word 3
        let mut line = bits(2, 8);
        line.push('0');
        line.push_str(&bits(0, 5));
        line.push_str(&bits(0, 32));
        line.push('1');
        line.push_str(&bits(3, 5));
        line.push_str(&bits(7, 32));
        let ev = config.decode(&line).unwrap().unwrap();
        assert_eq!(ev, TraceEvent::MemoryWrite { pc: 8, address: 12, data: 7 });
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let c = BitLineClassifier::default();
        let err = c.classify("0101 2").unwrap_err();
        assert!(matches!(err, JudgeError::Decode { .. }));
        assert!(err.to_string().contains("0101 2"));
    }

    #[test]
    fn test_decode_pc_underflow() {
        let config = DecodeConfig { pc_start: 0x4000, ..DecodeConfig::default() };
        assert!(config.decode(&row(0, true, 1, 1, None)).is_err());
    }

    #[test]
    fn test_validate_widths() {
        assert!(DecodeConfig::default().validate().is_ok());
        assert!(DecodeConfig { pc_width: 65, ..DecodeConfig::default() }.validate().is_err());
        assert!(DecodeConfig { dma_width: 0, ..DecodeConfig::default() }.validate().is_err());
    }
}

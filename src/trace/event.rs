use std::fmt;

use serde::{Deserialize, Serialize};

/// Address the reference generator loads `.text` at.
pub const LOAD_ORIGIN: u64 = 0x3000;

/// How the two-character register field is padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterPadding {
    /// `$08`
    #[default]
    Zero,
    /// `$ 8`
    Space,
}

/// One architectural write observed in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    RegisterWrite { pc: u64, reg_index: u8, data: u32 },
    MemoryWrite { pc: u64, address: u64, data: u32 },
}

impl TraceEvent {
    pub fn pc(&self) -> u64 {
        match self {
            TraceEvent::RegisterWrite { pc, .. } | TraceEvent::MemoryWrite { pc, .. } => *pc,
        }
    }

    /// Render in the reference generator's trace line format.
    pub fn render(&self, padding: RegisterPadding) -> String {
        match *self {
            TraceEvent::RegisterWrite { pc, reg_index, data } => {
                let reg = match padding {
                    RegisterPadding::Zero => format!("{reg_index:02}"),
                    RegisterPadding::Space => format!("{reg_index:>2}"),
                };
                format!("@{pc:08x}: ${reg} <= {data:08x}")
            }
            TraceEvent::MemoryWrite { pc, address, data } => {
                format!("@{pc:08x}: *{address:08x} <= {data:08x}")
            }
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(RegisterPadding::default()))
    }
}

//! Load a program image into the ROM of a Logisim circuit description.
//!
//! The ROM is found at `circuit/comp[@name="ROM"]/a[@name="contents"]`, in the
//! first circuit that has one or in the circuit named by the caller. Its text
//! is a header line `addr/data: <addr_width> <data_width>` followed by rows of
//! up to eight hex words.

use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::{JudgeError, JudgeResult, short_hash};

use super::ProgramImage;

const WORDS_PER_ROW: usize = 8;
const ROM_DATA_WIDTH: u32 = 32;

/// Parsed ROM content descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomContents {
    pub header: String,
    pub addr_width: u32,
    pub data_width: u32,
    pub words: Vec<u32>,
}

impl RomContents {
    fn parse(path: &Path, text: &str) -> JudgeResult<Self> {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default().trim().to_string();
        let widths: Vec<u32> = header
            .split_once(':')
            .map(|(_, rest)| rest.split_whitespace().filter_map(|w| w.parse().ok()).collect())
            .unwrap_or_default();
        let &[addr_width, data_width] = widths.as_slice() else {
            return Err(JudgeError::Structural {
                path: path.to_path_buf(),
                message: format!("malformed rom contents header {header:?}"),
            });
        };
        let words = lines
            .flat_map(|l| l.split_whitespace())
            .filter_map(|w| u32::from_str_radix(w, 16).ok())
            .collect();
        Ok(RomContents { header, addr_width, data_width, words })
    }

    /// Number of words the ROM can hold, `None` when it exceeds `u64`.
    pub fn capacity(&self) -> Option<u64> {
        1u64.checked_shl(self.addr_width)
    }

    fn render(&self, words: &[u32]) -> String {
        let mut lines = vec![self.header.clone()];
        for row in words.chunks(WORDS_PER_ROW) {
            let row: Vec<String> = row.iter().map(|w| format!("{w:x}")).collect();
            lines.push(row.join(" "));
        }
        lines.join("\n") + "\n"
    }
}

/// Result of patching a circuit.
#[derive(Debug, Clone)]
pub struct PatchedCircuit {
    /// The rewritten circuit description
    pub path: PathBuf,
    /// `v2.0 raw` image for loading into the ROM by hand
    pub image_path: PathBuf,
    /// Instructions written into the ROM
    pub instructions: usize,
}

struct ParsedCircuit {
    events: Vec<Event<'static>>,
    contents_index: usize,
    contents: RomContents,
}

fn attr_value(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(path: &Path, e: impl std::fmt::Display) -> JudgeError {
    JudgeError::Structural {
        path: path.to_path_buf(),
        message: format!("malformed circuit description: {e}"),
    }
}

fn parse_circuit(path: &Path, im_circuit: Option<&str>) -> JudgeResult<ParsedCircuit> {
    let xml = std::fs::read_to_string(path).map_err(|e| JudgeError::io(path, e))?;
    let mut reader = Reader::from_str(&xml);

    let mut events = Vec::new();
    let mut in_circuit = false;
    let mut in_rom = false;
    let mut in_contents = false;
    let mut contents_index = None;
    let mut contents_text = None;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(path, e))?;
        match &event {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"circuit" => {
                    in_circuit = match im_circuit {
                        Some(name) => attr_value(e, "name").as_deref() == Some(name),
                        None => true,
                    };
                }
                b"comp" if in_circuit => {
                    in_rom = attr_value(e, "name").as_deref() == Some("ROM");
                }
                b"a" if in_rom && contents_index.is_none() => {
                    in_contents = attr_value(e, "name").as_deref() == Some("contents");
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"circuit" => in_circuit = false,
                b"comp" => in_rom = false,
                b"a" => in_contents = false,
                _ => {}
            },
            Event::Text(t) if in_contents && contents_index.is_none() => {
                let text = t.unescape().map_err(|e| xml_error(path, e))?.into_owned();
                contents_index = Some(events.len());
                contents_text = Some(text);
            }
            _ => {}
        }
        events.push(event.into_owned());
    }

    let (Some(contents_index), Some(text)) = (contents_index, contents_text) else {
        let scope = match im_circuit {
            Some(name) => format!("circuit {name}"),
            None => "any circuit".to_string(),
        };
        return Err(JudgeError::Structural {
            path: path.to_path_buf(),
            message: format!("no rom comp found in {scope}"),
        });
    };
    let contents = RomContents::parse(path, &text)?;
    Ok(ParsedCircuit { events, contents_index, contents })
}

/// Write `bytes` next to `path` and rename it into place, so a failed write
/// never leaves a truncated file behind.
fn write_replacing(path: &Path, bytes: &[u8]) -> JudgeResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
    written.map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        JudgeError::io(path, e)
    })
}

/// Remove circuits patched earlier from the same description, keeping `keep`.
fn prune_stale(out_dir: &Path, circ_stem: &str, ext: &str, keep: &Path) {
    let pattern = format!(
        "{}/{}-{}{}",
        glob::Pattern::escape(&out_dir.to_string_lossy()),
        glob::Pattern::escape(circ_stem),
        "[0-9a-f]".repeat(10),
        glob::Pattern::escape(ext),
    );
    let Ok(paths) = glob::glob(&pattern) else {
        return;
    };
    for stale in paths.flatten().filter(|p| p != keep) {
        if let Err(e) = std::fs::remove_file(&stale) {
            debug!("cannot remove {}: {e}", stale.display());
        }
    }
}

/// Read the ROM contents of a circuit without modifying it.
pub fn read_rom_contents(circ_path: &Path, im_circuit: Option<&str>) -> JudgeResult<RomContents> {
    Ok(parse_circuit(circ_path, im_circuit)?.contents)
}

/// Write `hex_path`'s program into the circuit's ROM.
///
/// The original description is left untouched; the patched copy is written to
/// `out_dir` under a name derived from a hash of the program text, so
/// concurrent jobs never overwrite each other's circuits.
pub fn patch_circuit(
    circ_path: &Path,
    hex_path: &Path,
    im_circuit: Option<&str>,
    out_dir: &Path,
) -> JudgeResult<PatchedCircuit> {
    let ParsedCircuit { mut events, contents_index, contents } =
        parse_circuit(circ_path, im_circuit)?;

    if contents.data_width != ROM_DATA_WIDTH {
        return Err(JudgeError::Structural {
            path: circ_path.to_path_buf(),
            message: format!(
                "data width of the rom is {}, {ROM_DATA_WIDTH} expected",
                contents.data_width
            ),
        });
    }

    let hex = std::fs::read_to_string(hex_path).map_err(|e| JudgeError::io(hex_path, e))?;
    let image = ProgramImage::parse(&hex);
    let instrs = image.trimmed();
    if let Some(cap) = contents.capacity() {
        if instrs.len() as u64 > cap {
            return Err(JudgeError::Capacity {
                count: instrs.len(),
                addr_width: contents.addr_width,
            });
        }
    }

    let text = contents.render(instrs);
    events[contents_index] = Event::Text(BytesText::new(&text).into_owned());
    let mut writer = Writer::new(Vec::new());
    for event in events {
        writer.write_event(event).map_err(|e| xml_error(circ_path, e))?;
    }

    std::fs::create_dir_all(out_dir).map_err(|e| JudgeError::io(out_dir, e))?;
    let hex_stem = hex_path.file_stem().unwrap_or_default().to_string_lossy();
    let image_path = out_dir.join(format!("{hex_stem}-image.hex"));
    let circ_stem = circ_path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = circ_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let path = out_dir.join(format!("{circ_stem}-{}{ext}", short_hash(hex.as_bytes())));

    write_replacing(&image_path, format!("v2.0 raw\n{hex}").as_bytes())?;
    if let Err(e) = write_replacing(&path, &writer.into_inner()) {
        let _ = std::fs::remove_file(&image_path);
        return Err(e);
    }
    prune_stale(out_dir, &circ_stem, &ext, &path);

    debug!(circuit = %path.display(), instructions = instrs.len(), "patched rom");
    Ok(PatchedCircuit { path, image_path, instructions: instrs.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circuit(addr_width: u32, data_width: u32) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<project source="2.7.1" version="1.0">
  <circuit name="main">
    <comp lib="0" loc="(100,100)" name="Pin"/>
    <comp lib="4" loc="(200,200)" name="ROM">
      <a name="addrWidth" val="{addr_width}"/>
      <a name="dataWidth" val="{data_width}"/>
      <a name="contents">addr/data: {addr_width} {data_width}
0
</a>
    </comp>
  </circuit>
  <circuit name="IFU">
    <comp lib="4" loc="(10,10)" name="ROM">
      <a name="contents">addr/data: 2 32
0
</a>
    </comp>
  </circuit>
</project>
"#
        )
    }

    fn write_fixture(dir: &Path, circ: &str, words: &[u32]) -> (PathBuf, PathBuf) {
        let circ_path = dir.join("cpu.circ");
        std::fs::write(&circ_path, circ).unwrap();
        let hex_path = dir.join("prog.hex");
        std::fs::write(&hex_path, ProgramImage::from_words(words.to_vec()).to_hex_text()).unwrap();
        (circ_path, hex_path)
    }

    #[test]
    fn test_patch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let words: Vec<u32> = (1..=11).collect();
        let mut with_fill = words.clone();
        with_fill.extend([0, 0, 0]);
        let (circ, hex) = write_fixture(dir.path(), &circuit(5, 32), &with_fill);

        let out = dir.path().join("out");
        let patched = patch_circuit(&circ, &hex, None, &out).unwrap();
        assert_eq!(patched.instructions, 11);
        assert!(patched.path.starts_with(&out));
        assert!(patched.image_path.exists());

        let rom = read_rom_contents(&patched.path, None).unwrap();
        assert_eq!(rom.words, words);
        assert_eq!(rom.header, "addr/data: 5 32");

        let raw = std::fs::read_to_string(&patched.path).unwrap();
        assert!(raw.contains("1 2 3 4 5 6 7 8\n9 a b\n"));
        // the other circuit is untouched
        let ifu = read_rom_contents(&patched.path, Some("IFU")).unwrap();
        assert_eq!(ifu.words, vec![0]);
    }

    #[test]
    fn test_patch_named_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(dir.path(), &circuit(5, 32), &[0x10, 0x20]);
        let patched = patch_circuit(&circ, &hex, Some("IFU"), dir.path()).unwrap();
        assert_eq!(read_rom_contents(&patched.path, Some("IFU")).unwrap().words, vec![0x10, 0x20]);
        assert_eq!(read_rom_contents(&patched.path, None).unwrap().words, vec![0]);
    }

    #[test]
    fn test_capacity_exceeded_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = circuit(2, 32);
        let (circ, hex) = write_fixture(dir.path(), &original, &[1, 2, 3, 4, 5]);
        let out = dir.path().join("out");
        let err = patch_circuit(&circ, &hex, None, &out).unwrap_err();
        assert!(matches!(err, JudgeError::Capacity { count: 5, addr_width: 2 }));
        assert_eq!(std::fs::read_to_string(&circ).unwrap(), original);
        assert!(!out.exists());
    }

    #[test]
    fn test_capacity_counts_trimmed_words() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(dir.path(), &circuit(2, 32), &[1, 2, 3, 4, 0, 0]);
        assert!(patch_circuit(&circ, &hex, None, dir.path()).is_ok());
    }

    #[test]
    fn test_wrong_data_width() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(dir.path(), &circuit(5, 16), &[1]);
        let err = patch_circuit(&circ, &hex, None, dir.path()).unwrap_err();
        assert!(matches!(err, JudgeError::Structural { .. }));
        assert!(err.to_string().contains("data width of the rom is 16"));
    }

    #[test]
    fn test_missing_rom() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(
            dir.path(),
            r#"<project><circuit name="main"><comp name="Pin"/></circuit></project>"#,
            &[1],
        );
        let err = patch_circuit(&circ, &hex, None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("no rom comp found"));
        let err = patch_circuit(&circ, &hex, Some("nope"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("circuit nope"));
    }

    #[test]
    fn test_hash_names_differ_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(dir.path(), &circuit(5, 32), &[1]);
        let a = patch_circuit(&circ, &hex, None, dir.path()).unwrap();
        std::fs::write(&hex, "00000002\n").unwrap();
        let b = patch_circuit(&circ, &hex, None, dir.path()).unwrap();
        assert_ne!(a.path, b.path);
        // only the latest patch stays in the slot; the original is kept
        assert!(!a.path.exists());
        assert!(b.path.exists());
        assert!(circ.exists());
    }

    #[test]
    fn test_failed_circuit_write_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let (circ, hex) = write_fixture(dir.path(), &circuit(5, 32), &[1, 2]);
        let out = dir.path().join("out");
        let text = std::fs::read_to_string(&hex).unwrap();
        // a directory where the patched circuit should go
        std::fs::create_dir_all(out.join(format!("cpu-{}.circ", short_hash(text.as_bytes())))).unwrap();

        let err = patch_circuit(&circ, &hex, None, &out).unwrap_err();
        assert!(matches!(err, JudgeError::Io { .. }));
        assert!(!out.join("prog-image.hex").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}

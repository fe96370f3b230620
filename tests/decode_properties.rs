use cpu_judge::trace::{BitLineClassifier, DecodeConfig, LineClassifier, TraceEvent};
use proptest::prelude::*;

fn row(pc: u32, we: bool, reg: u8, data: u32, mem: Option<(u32, u32)>) -> String {
    let mut s = format!("{pc:032b}{}{reg:05b}{data:032b}", u8::from(we));
    match mem {
        Some((addr, d)) => s.push_str(&format!("1{addr:032b}{d:032b}")),
        None => s.push('0'),
    }
    s
}

proptest! {
    #[test]
    fn decoding_is_deterministic(
        pc in any::<u32>(),
        we in any::<bool>(),
        reg in 0u8..32,
        data in any::<u32>(),
        mem in proptest::option::of((any::<u32>(), any::<u32>())),
    ) {
        let line = row(pc, we, reg, data, mem);
        let config = DecodeConfig::default();
        let first = config.decode(&line).unwrap();
        let second = config.decode(&line).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn register_zero_is_never_emitted(
        pc in any::<u32>(),
        data in any::<u32>(),
        mem in proptest::option::of((any::<u32>(), any::<u32>())),
    ) {
        let line = row(pc, true, 0, data, mem);
        match DecodeConfig::default().decode(&line).unwrap() {
            Some(TraceEvent::RegisterWrite { .. }) => prop_assert!(false, "register 0 write emitted"),
            Some(TraceEvent::MemoryWrite { address, data: d, .. }) => {
                let (addr, want) = mem.unwrap();
                prop_assert_eq!(address, u64::from(addr));
                prop_assert_eq!(d, want);
            }
            None => prop_assert!(mem.is_none()),
        }
    }

    #[test]
    fn classifier_renders_register_writes(
        pc in 0u32..0x1000,
        reg in 1u8..32,
        data in any::<u32>(),
    ) {
        let classifier = BitLineClassifier::new(DecodeConfig::default());
        let line = classifier.classify(&row(pc, true, reg, data, None)).unwrap().unwrap();
        prop_assert_eq!(line, format!("@{:08x}: ${reg:02} <= {data:08x}", 0x3000 + u64::from(pc)));
    }
}

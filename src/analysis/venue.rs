//! Venue labelling from program ids and textual hints.

use crate::types::RawTransaction;

pub const UNKNOWN_VENUE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramClass {
    Dex,
    Generic,
}

/// Known programs. DEX entries win over the generic ones.
const KNOWN_PROGRAMS: &[(&str, &str, ProgramClass)] = &[
    ("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", "Jupiter", ProgramClass::Dex),
    ("JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB", "Jupiter", ProgramClass::Dex),
    ("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", "Raydium", ProgramClass::Dex),
    ("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc", "Orca", ProgramClass::Dex),
    ("9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP", "Orca", ProgramClass::Dex),
    ("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P", "Pump.fun", ProgramClass::Dex),
    ("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "Token Program", ProgramClass::Generic),
    ("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb", "Token Program", ProgramClass::Generic),
    ("11111111111111111111111111111111", "System Transfer", ProgramClass::Generic),
];

/// Keywords searched (case-insensitively) in source, description and logs.
const TEXT_HINTS: &[(&str, &str)] = &[
    ("jupiter", "Jupiter"),
    ("raydium", "Raydium"),
    ("orca", "Orca"),
    ("whirlpool", "Orca"),
    ("pump", "Pump.fun"),
];

fn lookup(program_id: &str) -> Option<(&'static str, ProgramClass)> {
    KNOWN_PROGRAMS
        .iter()
        .find(|(id, _, _)| *id == program_id)
        .map(|(_, name, class)| (*name, *class))
}

fn text_hint(text: &str) -> Option<&'static str> {
    let lower = text.to_ascii_lowercase();
    TEXT_HINTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, venue)| *venue)
}

/// Label the venue of a transaction.
///
/// Order: a DEX program anywhere in the instruction tree, then a DEX named in
/// the feed's source/description or the logs, then a generic program, then
/// [`UNKNOWN_VENUE`].
pub fn detect_venue(tx: &RawTransaction) -> String {
    let mut generic = None;

    for ix in tx.all_instructions() {
        match lookup(&ix.program_id) {
            Some((name, ProgramClass::Dex)) => return name.to_string(),
            Some((name, ProgramClass::Generic)) if generic.is_none() => generic = Some(name),
            _ => {}
        }
    }

    let texts = tx
        .source
        .iter()
        .chain(tx.description.iter())
        .chain(tx.logs().iter());
    for text in texts {
        if let Some(venue) = text_hint(text) {
            return venue.to_string();
        }
    }

    generic.unwrap_or(UNKNOWN_VENUE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawInstruction, TransactionMeta};

    fn ix(program_id: &str) -> RawInstruction {
        RawInstruction {
            program_id: program_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dex_beats_generic() {
        let tx = RawTransaction {
            instructions: vec![
                ix("11111111111111111111111111111111"),
                ix("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"),
            ],
            ..Default::default()
        };
        assert_eq!(detect_venue(&tx), "Raydium");
    }

    #[test]
    fn test_inner_instruction_matches() {
        let mut outer = ix("SomeRouter1111111111111111111111111111111111");
        outer.inner_instructions = vec![ix("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc")];
        let tx = RawTransaction {
            instructions: vec![outer],
            ..Default::default()
        };
        assert_eq!(detect_venue(&tx), "Orca");
    }

    #[test]
    fn test_text_hint_before_generic() {
        let tx = RawTransaction {
            instructions: vec![ix("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA")],
            meta: Some(TransactionMeta {
                log_messages: vec!["Program log: Jupiter route".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(detect_venue(&tx), "Jupiter");

        let plain = RawTransaction {
            instructions: vec![ix("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA")],
            ..Default::default()
        };
        assert_eq!(detect_venue(&plain), "Token Program");
    }

    #[test]
    fn test_source_label() {
        let tx = RawTransaction {
            source: Some("PUMP_FUN".to_string()),
            ..Default::default()
        };
        assert_eq!(detect_venue(&tx), "Pump.fun");
    }

    #[test]
    fn test_unknown() {
        let tx = RawTransaction {
            instructions: vec![ix("Unrecognized11111111111111111111111111111111")],
            ..Default::default()
        };
        assert_eq!(detect_venue(&tx), UNKNOWN_VENUE);
    }
}

// Saved pattern shape and the JSON file helpers around it.
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::{Session, Tempo};
use crate::error::PatternImportMismatch;
use crate::shared::{Instrument, TRACK_COUNT};

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedPattern {
    pub version: String,
    pub tempo: f64,
    pub pattern: Vec<SavedRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedRow {
    pub instrument: String,
    #[serde(alias = "cells")]
    // 0 or 1 per step. Read as raw JSON so a bad cell only rejects its row.
    pub pattern: Vec<Value>,
}

pub fn export(session: &Session) -> SavedPattern {
    let pattern = Instrument::ALL
        .iter()
        .map(|&instrument| SavedRow {
            instrument: instrument.name().to_string(),
            pattern: session
                .pattern
                .row(instrument)
                .iter()
                .map(|&on| Value::from(u32::from(on)))
                .collect(),
        })
        .collect();
    SavedPattern {
        version: FORMAT_VERSION.to_string(),
        tempo: session.tempo.bpm(),
        pattern,
    }
}

/// Replace the session's grid and tempo with `saved`.
///
/// Rows that don't fit the current step count, or name an instrument we
/// don't have, are skipped; the rest still load. Returns one entry per
/// skipped row (and one for a rejected tempo).
pub fn import(session: &mut Session, saved: &SavedPattern) -> Vec<PatternImportMismatch> {
    let mut warnings = Vec::new();
    match Tempo::new(saved.tempo) {
        Ok(tempo) => session.tempo = tempo,
        Err(_) => warnings.push(PatternImportMismatch::InvalidTempo(saved.tempo)),
    }

    let expected = session.pattern.step_count();
    session.pattern.clear();
    let mut seen = [false; TRACK_COUNT];
    for (row, saved_row) in saved.pattern.iter().enumerate() {
        let instrument = match saved_row.instrument.parse::<Instrument>() {
            Ok(instrument) => instrument,
            Err(_) => {
                warnings.push(PatternImportMismatch::UnknownInstrument {
                    row,
                    name: saved_row.instrument.clone(),
                });
                continue;
            }
        };
        if let Err(skip) = check_row(row, instrument, &saved_row.pattern, expected, &seen) {
            warnings.push(skip);
            continue;
        }
        seen[instrument.index()] = true;
        for (step, cell) in saved_row.pattern.iter().enumerate() {
            // in range: the row length was just checked
            let _ = session.pattern.set(instrument, step, cell.as_u64() == Some(1));
        }
    }
    warnings
}

fn check_row(
    row: usize,
    instrument: Instrument,
    cells: &[Value],
    expected: usize,
    seen: &[bool],
) -> Result<(), PatternImportMismatch> {
    if seen[instrument.index()] {
        return Err(PatternImportMismatch::DuplicateInstrument { row, instrument });
    }
    if cells.len() != expected {
        return Err(PatternImportMismatch::LengthMismatch {
            row,
            instrument,
            found: cells.len(),
            expected,
        });
    }
    let bit = |cell: &Value| matches!(cell.as_u64(), Some(0 | 1));
    if let Some((step, cell)) = cells.iter().enumerate().find(|(_, cell)| !bit(*cell)) {
        return Err(PatternImportMismatch::InvalidCell {
            row,
            instrument,
            step,
            value: cell.to_string(),
        });
    }
    Ok(())
}

pub fn load_pattern(path: &Path) -> anyhow::Result<SavedPattern> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading pattern {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing pattern {}", path.display()))
}

// Write the pattern as pretty JSON, making parent dirs if they don't exist already
pub fn save_pattern(path: &Path, saved: &SavedPattern) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(saved)?;
    std::fs::write(path, json).with_context(|| format!("writing pattern {}", path.display()))?;
    Ok(())
}

// src/exec/builtin.rs

//! Stages every worker knows about.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use super::stage::{StageContext, StageError};

/// Copy `consumes[i]` to `produces[i]` for every pair.
pub fn copy(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    if ctx.consumes().len() != ctx.produces().len() {
        return Err(StageError::failed(format!(
            "copy needs as many inputs as outputs (got {} and {})",
            ctx.consumes().len(),
            ctx.produces().len()
        )));
    }

    let pairs: Vec<_> = ctx
        .consumes()
        .iter()
        .cloned()
        .zip(ctx.produces().iter().cloned())
        .collect();
    for (from, to) in pairs {
        fs::copy(&from, &to)?;
        ctx.step(format!("copied {} to {}", from.display(), to.display()));
    }
    Ok(())
}

/// Merge pronunciation lexicons into `produces[0]`.
///
/// Each line is `WORD PRONUNCIATION...`. Inputs are read in order and the
/// first definition of a word wins; the output is sorted by word.
pub fn combine_lexicons(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    if ctx.consumes().is_empty() {
        return Err(StageError::failed("combine_lexicons needs at least one input"));
    }
    let output = ctx.output(0)?.to_path_buf();

    let mut lexicon: BTreeMap<String, String> = BTreeMap::new();
    let inputs = ctx.consumes().to_vec();
    for path in inputs {
        let text = fs::read_to_string(&path)?;
        let before = lexicon.len();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (word, pronunciation) = line.split_once(' ').unwrap_or((line, ""));
            lexicon
                .entry(word.to_string())
                .or_insert_with(|| pronunciation.to_string());
        }
        ctx.step(format!(
            "merged {} ({} new words)",
            path.display(),
            lexicon.len() - before
        ));
    }

    let mut out = fs::File::create(&output)?;
    for (word, pronunciation) in &lexicon {
        writeln!(out, "{word} {pronunciation}")?;
    }
    out.flush()?;
    Ok(())
}

//! Line-number realignment.
//!
//! Engines report where each decompiled line came from in the original source. Padding the
//! decompiled text with blank lines makes line `N` of the output sit at original line `N`,
//! so stack traces point at the right place.

use std::collections::BTreeMap;

/// Sparse mapping from 1-based decompiled line to 1-based original line.
///
/// Entries may arrive in any order; iteration is always by decompiled line. A later entry for
/// the same decompiled line replaces the earlier one. Non-positive lines are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMapping {
    lines: BTreeMap<u32, u32>,
}

impl LineMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, decompiled: u32, original: u32) {
        if decompiled > 0 && original > 0 {
            self.lines.insert(decompiled, original);
        }
    }

    /// Builds a mapping from a flat `[decompiled, original, decompiled, original, ..]` array.
    /// A trailing odd element is ignored.
    pub fn from_flat_pairs(flat: &[i32]) -> Self {
        let mut mapping = Self::new();
        for pair in flat.chunks_exact(2) {
            if let (Ok(decompiled), Ok(original)) = (u32::try_from(pair[0]), u32::try_from(pair[1]))
            {
                mapping.insert(decompiled, original);
            }
        }
        mapping
    }

    pub fn get(&self, decompiled: u32) -> Option<u32> {
        self.lines.get(&decompiled).copied()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.lines.iter().map(|(k, v)| (*k, *v))
    }
}

impl Extend<(u32, u32)> for LineMapping {
    fn extend<T: IntoIterator<Item = (u32, u32)>>(&mut self, iter: T) {
        for (decompiled, original) in iter {
            self.insert(decompiled, original);
        }
    }
}

impl FromIterator<(u32, u32)> for LineMapping {
    fn from_iter<T: IntoIterator<Item = (u32, u32)>>(iter: T) -> Self {
        let mut mapping = Self::new();
        mapping.extend(iter);
        mapping
    }
}

/// Inserts blank lines so each mapped input line lands on its original line number.
///
/// Targets at or behind the running output line are ignored: lines are never removed or
/// reordered, so output is never shorter than input. Entries past the end of the text are
/// unreachable. An empty mapping returns the text unchanged.
pub fn realign(text: &str, mapping: &LineMapping) -> String {
    if mapping.is_empty() {
        return text.to_string();
    }

    let mut out: Vec<&str> = Vec::new();
    let mut current_output_line: u32 = 1;

    for (idx, line) in text.split('\n').enumerate() {
        let decompiled_line = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        if let Some(original) = mapping.get(decompiled_line)
            && original > current_output_line
        {
            for _ in current_output_line..original {
                out.push("");
            }
            current_output_line = original;
        }
        out.push(line);
        current_output_line = current_output_line.saturating_add(1);
    }

    out.join("\n")
}

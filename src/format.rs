//! On-disk forms of selections.
//!
//! Two formats: the plain index list shared with other tools, and the JSON
//! session document holding the active selection plus every saved one.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mesh::Vertex;
use crate::selection::{SavedSelections, SelectionSet};

/// Parses a plain index list.
///
/// Accepts either one index per line or, when the text is a single line,
/// comma-separated indices. Blank entries are skipped. Any other malformed
/// entry fails the whole read.
pub fn parse_index_list(text: &str) -> Result<SelectionSet> {
    let lines: Vec<&str> = text.lines().collect();
    let entries: Vec<(usize, &str)> = match lines.as_slice() {
        [single] => single.split(',').map(|token| (1, token)).collect(),
        _ => lines.iter().enumerate().map(|(i, l)| (i + 1, *l)).collect(),
    };

    let mut selection = SelectionSet::new();
    for (line, token) in entries {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let index: usize = token.parse().map_err(|_| Error::Parse {
            line,
            token: token.to_owned(),
        })?;
        selection.add(Vertex::from(index));
    }
    Ok(selection)
}

/// Formats a selection as one index per line with no trailing newline.
pub fn format_index_list(selection: &SelectionSet) -> String {
    selection
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn load_index_list<P: AsRef<Path>>(file: P) -> Result<SelectionSet> {
    let string = std::fs::read_to_string(file)?;
    parse_index_list(&string)
}

pub fn save_index_list<P: AsRef<Path>>(file: P, selection: &SelectionSet) -> Result<()> {
    std::fs::write(file, format_index_list(selection))?;
    Ok(())
}

/// Persisted selection state of an editing session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub selection: SelectionSet,
    pub saved: SavedSelections,
}

impl SessionState {
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let string = std::fs::read_to_string(file)?;
        Ok(serde_json::from_str(&string)?)
    }

    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let string = serde_json::to_string_pretty(self)?;
        std::fs::write(file, string)?;
        Ok(())
    }
}

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use shared::types::{Identifier, ReferenceRecord};
use crate::atomic::write_atomic;

/// What a watchlist entry's value is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKey {
    /// Transponder hex code
    #[serde(rename = "icao24")]
    Identifier,
    /// Registration mark, resolved through the reference database
    #[serde(rename = "mark")]
    Mark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub key: MatchKey,
    pub value: String,
    #[serde(rename = "display_msg")]
    pub display_message: String,
}

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("no watchlist entry for {key:?} {value}")]
    NotFound { key: MatchKey, value: String },

    #[error("watchlist I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed watchlist line {line} in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize watchlist entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

/// Immutable view of the watchlist used for classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    entries: Vec<WatchlistEntry>,
}

impl Watchlist {
    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: MatchKey, value: &str) -> Option<usize> {
        let value = normalize(value);
        self.entries
            .iter()
            .position(|e| e.key == key && e.value == value)
    }

    pub fn contains(&self, key: MatchKey, value: &str) -> bool {
        self.position(key, value).is_some()
    }

    /// Display label of an entry. Callers check `contains` (or use `find`)
    /// first; a missing entry is reported as NotFound.
    pub fn get_display(&self, key: MatchKey, value: &str) -> Result<&str, WatchlistError> {
        self.position(key, value)
            .map(|idx| self.entries[idx].display_message.as_str())
            .ok_or_else(|| WatchlistError::NotFound {
                key,
                value: normalize(value),
            })
    }

    /// Entry matching an aircraft. Identifier entries win over mark entries;
    /// mark entries only match when a reference record with a mark exists.
    pub fn find(
        &self,
        identifier: &Identifier,
        reference: Option<&ReferenceRecord>,
    ) -> Option<&WatchlistEntry> {
        let by_identifier = self
            .entries
            .iter()
            .find(|e| e.key == MatchKey::Identifier && e.value == identifier.as_str());
        if by_identifier.is_some() {
            return by_identifier;
        }

        let mark = normalize(reference?.registration_mark.as_deref()?);
        self.entries
            .iter()
            .find(|e| e.key == MatchKey::Mark && e.value == mark)
    }
}

/// File-backed watchlist, one JSON entry per line.
///
/// `add` appends a line. `remove` rewrites the whole file through
/// [`write_atomic`], copying the surviving lines verbatim.
pub struct WatchlistStore {
    path: PathBuf,
    watchlist: Watchlist,
    /// Raw file line of each entry, index-aligned with `watchlist.entries`
    lines: Vec<String>,
    /// Whether the file ends in a newline, so an append starts a fresh line
    terminated: bool,
}

fn render_lines<'a>(lines: impl IntoIterator<Item = &'a String>) -> String {
    let mut contents = String::new();
    for line in lines {
        contents.push_str(line);
        contents.push('\n');
    }
    contents
}

impl WatchlistStore {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatchlistError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source: std::io::Error| WatchlistError::Io { path: path.clone(), source };

        if !path.exists() {
            write_atomic(&path, b"").map_err(io_err)?;
        }

        let contents = fs::read_to_string(&path).map_err(io_err)?;
        let mut terminated = contents.is_empty() || contents.ends_with('\n');
        let last_idx = contents.lines().count().saturating_sub(1);
        let mut torn = false;
        let mut watchlist = Watchlist::default();
        let mut lines = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut entry: WatchlistEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                // An unterminated final line is an append cut short
                Err(e) if idx == last_idx && !terminated => {
                    tracing::warn!(
                        "Dropping torn watchlist line {} in {}: {}",
                        idx + 1,
                        path.display(),
                        e
                    );
                    torn = true;
                    continue;
                }
                Err(source) => {
                    return Err(WatchlistError::Malformed {
                        path: path.clone(),
                        line: idx + 1,
                        source,
                    })
                }
            };
            entry.value = normalize(&entry.value);

            if watchlist.contains(entry.key, &entry.value) {
                tracing::warn!(
                    "Ignoring duplicate watchlist entry {:?} {} on line {}",
                    entry.key,
                    entry.value,
                    idx + 1
                );
                continue;
            }
            watchlist.entries.push(entry);
            lines.push(line.to_string());
        }

        if torn {
            write_atomic(&path, render_lines(&lines).as_bytes()).map_err(io_err)?;
            terminated = true;
        }

        Ok(Self { path, watchlist, lines, terminated })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn contains(&self, key: MatchKey, value: &str) -> bool {
        self.watchlist.contains(key, value)
    }

    pub fn get_display(&self, key: MatchKey, value: &str) -> Result<&str, WatchlistError> {
        self.watchlist.get_display(key, value)
    }

    /// Insert and persist an entry. Returns false if (key, value) is
    /// already present, comparing values case-insensitively.
    pub fn add(
        &mut self,
        key: MatchKey,
        value: &str,
        display_message: &str,
    ) -> Result<bool, WatchlistError> {
        if self.contains(key, value) {
            return Ok(false);
        }

        let entry = WatchlistEntry {
            key,
            value: normalize(value),
            display_message: display_message.to_string(),
        };
        let line = serde_json::to_string(&entry)?;

        let io_err = |source: std::io::Error| WatchlistError::Io { path: self.path.clone(), source };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let record = if self.terminated {
            format!("{}\n", line)
        } else {
            format!("\n{}\n", line)
        };
        file.write_all(record.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        self.terminated = true;
        self.watchlist.entries.push(entry);
        self.lines.push(line);
        Ok(true)
    }

    /// Delete an entry and rewrite the store. Returns false if absent.
    /// Memory is only updated once the replacement file is in place.
    pub fn remove(&mut self, key: MatchKey, value: &str) -> Result<bool, WatchlistError> {
        let Some(idx) = self.watchlist.position(key, value) else {
            return Ok(false);
        };

        let contents = render_lines(
            self.lines.iter().enumerate().filter(|(i, _)| *i != idx).map(|(_, line)| line),
        );
        write_atomic(&self.path, contents.as_bytes())
            .map_err(|source| WatchlistError::Io { path: self.path.clone(), source })?;

        self.watchlist.entries.remove(idx);
        self.lines.remove(idx);
        Ok(true)
    }
}

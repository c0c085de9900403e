use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use anyhow::{bail, Context, Result};
use serde::{Serialize, Deserialize};
use shared::types::{Identifier, ReferenceRecord};

/// How the reference file on disk is keyed. Runtime lookups are always
/// by identifier; a mark-keyed file is re-indexed at load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedBy {
    #[default]
    Identifier,
    Mark,
}

/// Record shape of a mark-keyed file; the identifier lives in the value.
#[derive(Deserialize)]
struct MarkIndexedRecord {
    #[serde(rename = "i")]
    identifier: Identifier,
    #[serde(rename = "t", default)]
    type_code: Option<String>,
    #[serde(rename = "f", default)]
    flags: String,
    #[serde(rename = "d", default)]
    description: Option<String>,
}

/// Read-only identifier -> record map, replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDatabase {
    records: HashMap<Identifier, ReferenceRecord>,
}

impl ReferenceDatabase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the database from a JSON object file
    pub fn load(path: impl AsRef<Path>, indexed_by: IndexedBy) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference database: {}", path.display()))?;

        Self::from_json(&contents, indexed_by)
            .with_context(|| format!("Failed to parse reference database: {}", path.display()))
    }

    pub fn from_json(json: &str, indexed_by: IndexedBy) -> Result<Self> {
        let records = match indexed_by {
            IndexedBy::Identifier => {
                let raw: HashMap<String, ReferenceRecord> = serde_json::from_str(json)?;
                raw.into_iter()
                    .map(|(hex, record)| (Identifier::new(hex), record))
                    .collect()
            }
            IndexedBy::Mark => {
                let raw: HashMap<String, MarkIndexedRecord> = serde_json::from_str(json)?;
                raw.into_iter()
                    .map(|(mark, record)| {
                        (
                            record.identifier,
                            ReferenceRecord {
                                registration_mark: Some(mark),
                                type_code: record.type_code,
                                flags: record.flags,
                                description: record.description,
                            },
                        )
                    })
                    .collect()
            }
        };

        Ok(Self { records })
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&ReferenceRecord> {
        self.records.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Run the external database refresh command (argv form) to completion.
pub fn run_update_command(argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("Reference update command is empty");
    };

    tracing::info!("Running reference update: {}", argv.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {}", program))?;

    if !status.success() {
        bail!("Reference update command exited with {}", status);
    }
    Ok(())
}

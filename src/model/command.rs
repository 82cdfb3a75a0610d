//! Built-in command records — the sum type a rule's `commands:` list holds
//! when it isn't a plain shell string, a struct-field-tag union keyed by
//! `kind`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MoveParams {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CopyParams {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct ZipParams {
    #[serde(default)]
    pub options: Option<String>,
    pub input: String,
    pub output: String,
    /// Directory to `cd` into before archiving, so paths inside the zip are relative to it.
    #[serde(default)]
    pub cd: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct UnzipParams {
    #[serde(default)]
    pub options: Option<String>,
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct ArchiveParams {
    #[serde(default)]
    pub options: Option<String>,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct UnarchiveParams {
    #[serde(default)]
    pub options: Option<String>,
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
}

/// One entry in a rule's command list. Either a plain shell string (dispatched
/// to the configured `Executor`) or one of the built-ins, which always run on
/// the host).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandRecord {
    Run { run: String },
    Mkdir { mkdir: String },
    Cleandir { cleandir: String },
    Remove { remove: RemovePaths },
    Move { r#move: MoveParams },
    Copy { copy: CopyParams },
    Zip { zip: ZipParams },
    Unzip { unzip: UnzipParams },
    Archive { archive: ArchiveParams },
    Unarchive { unarchive: UnarchiveParams },
}

/// `remove` accepts either a single path or a list of them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RemovePaths {
    One(String),
    Many(Vec<String>),
}

impl RemovePaths {
    pub fn as_slice(&self) -> Vec<&str> {
        match self {
            Self::One(p) => vec![p.as_str()],
            Self::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// A rule's `command`/`commands` field: either a single shell string, or an
/// ordered list of command records (plain strings and built-ins may mix).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandList {
    Single(String),
    List(Vec<CommandRecord>),
}

impl CommandList {
    /// Normalize into an ordered list of records, wrapping a bare string rule
    /// into a single-element `Run` list.
    pub fn into_records(self) -> Vec<CommandRecord> {
        match self {
            Self::Single(s) => vec![CommandRecord::Run { run: s }],
            Self::List(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_deserializes_from_tagged_field() {
        let yaml = "run: echo hi\n";
        let cmd: CommandRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cmd, CommandRecord::Run { run: "echo hi".into() });
    }

    #[test]
    fn zip_command_deserializes_nested_params() {
        let yaml = "zip:\n  input: dist/\n  output: dist.zip\n";
        let cmd: CommandRecord = serde_yaml::from_str(yaml).unwrap();
        match cmd {
            CommandRecord::Zip { zip } => {
                assert_eq!(zip.input, "dist/");
                assert_eq!(zip.output, "dist.zip");
            }
            other => panic!("expected Zip, got {other:?}"),
        }
    }

    #[test]
    fn remove_accepts_single_or_many_paths() {
        let single: RemovePaths = serde_yaml::from_str("foo.txt").unwrap();
        assert_eq!(single.as_slice(), vec!["foo.txt"]);

        let many: RemovePaths = serde_yaml::from_str("[a.txt, b.txt]").unwrap();
        assert_eq!(many.as_slice(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn bare_string_command_list_normalizes_to_single_run() {
        let list: CommandList = serde_yaml::from_str("touch ${OUTPUT}").unwrap();
        let records = list.into_records();
        assert_eq!(records, vec![CommandRecord::Run { run: "touch ${OUTPUT}".into() }]);
    }
}

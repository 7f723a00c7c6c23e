use std::fs;
use std::io::{self, Write};
use std::path::{self, Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Directory used when no history destination is supplied.
pub const DEFAULT_HISTORY_DIR: &str = "chat_history";

const HISTORY_EXTENSION: &str = "json";

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name on the chat-completions wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message. Turns are never edited after being appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation history for a single session.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Read-only view in conversation order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Renders the history document: an indented JSON array of `{role, content}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.turns)
    }

    /// Writes the transcript using the current local time for generated names.
    pub fn persist(&self, target: &SaveTarget, label: &str) -> io::Result<PathBuf> {
        self.persist_at(target, label, chrono::Local::now().naive_local())
    }

    /// Writes the transcript to the location `target` resolves to at `now`.
    ///
    /// The parent directory is created when missing and the file is replaced
    /// as a whole through a temporary sibling, so readers never observe a
    /// half-written history.
    pub fn persist_at(
        &self,
        target: &SaveTarget,
        label: &str,
        now: NaiveDateTime,
    ) -> io::Result<PathBuf> {
        let path = target.resolve(label, now);
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("Failed to create history directory '{}': {err}", dir.display()),
                )
            })?;
        }

        let contents = self.to_json().map_err(io::Error::other)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new_in(".")?,
        };
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(&path).map_err(|err| {
            io::Error::new(
                err.error.kind(),
                format!("Failed to write history file '{}': {}", path.display(), err.error),
            )
        })?;

        tracing::info!(path = %path.display(), turns = self.len(), "chat history saved");
        Ok(path)
    }
}

/// Where a transcript should be written, as supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveTarget {
    /// A file path (has an extension, no trailing separator) or a directory.
    pub path: Option<PathBuf>,
    /// Base name used inside a directory destination.
    pub name: Option<String>,
}

impl SaveTarget {
    /// Builds a target from raw answers, treating blank strings as absent.
    pub fn from_input(path: Option<&str>, name: Option<&str>) -> Self {
        let non_blank = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            path: non_blank(path).map(PathBuf::from),
            name: non_blank(name),
        }
    }

    /// True when the path names a file directly, so no base name is needed.
    pub fn is_file_path(&self) -> bool {
        self.path.as_deref().is_some_and(names_file)
    }

    /// Resolves the final file location for provider `label` at time `now`.
    pub fn resolve(&self, label: &str, now: NaiveDateTime) -> PathBuf {
        if let Some(path) = self.path.as_deref().filter(|path| names_file(path)) {
            return path.to_path_buf();
        }

        let dir = self
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR));
        let file_name = match &self.name {
            Some(name) if has_json_extension(name) => name.clone(),
            Some(name) => format!("{name}.{HISTORY_EXTENSION}"),
            None => format!("chat_{label}_{}.{HISTORY_EXTENSION}", timestamp(now)),
        };
        dir.join(file_name)
    }
}

/// Timestamp fragment used in generated file names.
pub fn timestamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

fn names_file(path: &Path) -> bool {
    let raw = path.as_os_str().to_string_lossy();
    !raw.ends_with(['/', path::MAIN_SEPARATOR])
        && path.extension().is_some_and(|ext| !ext.is_empty())
}

fn has_json_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(HISTORY_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::{Role, SaveTarget, Transcript, Turn};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::fs;
    use std::path::PathBuf;

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|date| date.and_hms_opt(12, 30, 45))
            .expect("valid timestamp")
    }

    fn sample() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append(Turn::user("Bonjour"));
        transcript.append(Turn::assistant("Salut, ça va ?"));
        transcript
    }

    #[test]
    fn append_preserves_conversation_order() {
        let transcript = sample();
        let roles: Vec<Role> = transcript.snapshot().iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(transcript.snapshot()[1].content, "Salut, ça va ?");
    }

    #[test]
    fn json_uses_uppercase_roles_and_keeps_unicode() {
        let json = sample().to_json().expect("serializable");
        assert!(json.contains("\"role\": \"USER\""));
        assert!(json.contains("\"role\": \"ASSISTANT\""));
        assert!(json.contains("ça va"));
        assert!(json.starts_with("[\n  {"));
    }

    #[test]
    fn file_path_with_extension_is_used_verbatim() {
        let target = SaveTarget::from_input(Some("foo/bar.json"), Some("ignored"));
        assert!(target.is_file_path());
        assert_eq!(target.resolve("groq", fixed_clock()), PathBuf::from("foo/bar.json"));
    }

    #[test]
    fn directory_without_name_gets_timestamped_file() {
        let target = SaveTarget::from_input(Some("foo/"), None);
        assert_eq!(
            target.resolve("groq", fixed_clock()),
            PathBuf::from("foo").join("chat_groq_20240501_123045.json")
        );
    }

    #[test]
    fn trailing_separator_marks_dotted_directory() {
        let target = SaveTarget::from_input(Some("logs.d/"), None);
        assert!(!target.is_file_path());
        assert_eq!(
            target.resolve("groq", fixed_clock()),
            PathBuf::from("logs.d").join("chat_groq_20240501_123045.json")
        );
    }

    #[test]
    fn persist_into_dotted_directory_writes_timestamped_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let raw = format!("{}/logs.d/", root.path().display());
        let target = SaveTarget::from_input(Some(&raw), None);

        let written = sample()
            .persist_at(&target, "groq", fixed_clock())
            .expect("persist should succeed");

        assert_eq!(
            written,
            root.path().join("logs.d").join("chat_groq_20240501_123045.json")
        );
        assert!(written.is_file());
    }

    #[test]
    fn custom_name_gets_json_extension_when_missing() {
        let target = SaveTarget::from_input(Some("out"), Some("session"));
        assert_eq!(
            target.resolve("openai", fixed_clock()),
            PathBuf::from("out").join("session.json")
        );

        let named = SaveTarget::from_input(Some("out"), Some("session.json"));
        assert_eq!(
            named.resolve("openai", fixed_clock()),
            PathBuf::from("out").join("session.json")
        );

        let upper = SaveTarget::from_input(Some("out"), Some("Session.JSON"));
        assert_eq!(
            upper.resolve("openai", fixed_clock()),
            PathBuf::from("out").join("Session.JSON")
        );
    }

    #[test]
    fn custom_name_with_other_extension_still_ends_in_json() {
        for (name, expected) in [("notes.v2", "notes.v2.json"), ("chat.txt", "chat.txt.json")] {
            let target = SaveTarget::from_input(Some("out"), Some(name));
            assert_eq!(
                target.resolve("openai", fixed_clock()),
                PathBuf::from("out").join(expected)
            );
        }
    }

    #[test]
    fn blank_answers_fall_back_to_default_directory() {
        let target = SaveTarget::from_input(Some("  "), Some(""));
        assert_eq!(target, SaveTarget::default());
        assert_eq!(
            target.resolve("openai", fixed_clock()),
            PathBuf::from("chat_history").join("chat_openai_20240501_123045.json")
        );
    }

    #[test]
    fn persist_creates_missing_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("foo").join("bar.json");
        let target = SaveTarget {
            path: Some(path.clone()),
            name: None,
        };

        let written = sample()
            .persist_at(&target, "groq", fixed_clock())
            .expect("persist should succeed");

        assert_eq!(written, path);
        let contents = fs::read_to_string(&path).expect("history file");
        let turns: Vec<Turn> = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(turns, sample().snapshot());
    }

    #[test]
    fn persisting_twice_writes_identical_content() {
        let root = tempfile::tempdir().expect("tempdir");
        let transcript = sample();
        let first = SaveTarget::from_input(root.path().join("a.json").to_str(), None);
        let second = SaveTarget::from_input(root.path().join("b.json").to_str(), None);

        let first = transcript.persist_at(&first, "openai", fixed_clock()).expect("first");
        let second = transcript.persist_at(&second, "openai", fixed_clock()).expect("second");

        assert_eq!(
            fs::read(first).expect("first file"),
            fs::read(second).expect("second file")
        );
    }

    #[test]
    fn persist_fails_when_parent_is_a_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let blocker = root.path().join("blocker");
        fs::write(&blocker, "not a directory").expect("marker file");
        let target = SaveTarget {
            path: Some(blocker.join("history.json")),
            name: None,
        };

        let err = sample()
            .persist_at(&target, "openai", fixed_clock())
            .expect_err("directory creation should fail");
        assert!(err.to_string().contains("Failed to create history directory"));
    }
}

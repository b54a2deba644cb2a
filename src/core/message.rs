use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TranscriptRole {
    User,
    Assistant,
    ErrorNote,
}

/// One rendered transcript entry. Assistant entries carry both the raw
/// accumulated text and the bullet items derived from it; the items are
/// re-derived from the full buffer on every chunk while a stream is live and
/// frozen once the owning session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: TranscriptRole,
    pub content: String,
    /// Visually merge with the immediately preceding message of the same role.
    pub grouped: bool,
    #[serde(default)]
    pub items: Vec<String>,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::ErrorNote => "error",
        }
    }

    pub fn is_user(self) -> bool {
        self == TranscriptRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TranscriptRole::Assistant
    }
}

impl AsRef<str> for TranscriptRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for TranscriptRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "user" => Ok(TranscriptRole::User),
            "assistant" => Ok(TranscriptRole::Assistant),
            "error" => Ok(TranscriptRole::ErrorNote),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for TranscriptRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        Self::try_from(value.as_str())
    }
}

impl From<TranscriptRole> for String {
    fn from(value: TranscriptRole) -> Self {
        value.as_str().to_string()
    }
}

impl Message {
    pub fn user(content: impl Into<String>, grouped: bool) -> Self {
        Self {
            role: TranscriptRole::User,
            content: content.into(),
            grouped,
            items: Vec::new(),
        }
    }

    /// An empty assistant entry awaiting its first chunk.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: TranscriptRole::Assistant,
            content: String::new(),
            grouped: false,
            items: Vec::new(),
        }
    }

    /// Error notes are rendered inline after the assistant entry they
    /// belong to and never group.
    pub fn error_note(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::ErrorNote,
            content: content.into(),
            grouped: false,
            items: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }
}

//! Stored commands: names, keys and the raw signals they hold.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A `/`-separated command name such as `tv/power`.
///
/// Every segment is non-empty and neither `.` nor `..`, so a name can be
/// mapped onto a relative path without escaping its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandName(String);

impl CommandName {
    /// Validate and wrap a command name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCommandName`] for an empty name and
    /// [`ValidationError::InvalidCommandSegment`] for empty, `.` or `..`
    /// segments.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyCommandName);
        }
        if let Some(bad) = name
            .split('/')
            .find(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(ValidationError::InvalidCommandSegment(bad.to_string()));
        }
        Ok(Self(name))
    }

    /// The name as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Append a child segment (or several).
    ///
    /// # Errors
    ///
    /// Returns a validation error if `child` is not a valid name.
    pub fn join(&self, child: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{}/{child}", self.0))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommandName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Address of one stored command: an optional device namespace plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    /// Device-scoped namespace; `None` means the shared root.
    pub namespace: Option<CommandName>,
    /// The command name.
    pub name: CommandName,
}

impl CommandKey {
    /// Create a key.
    #[must_use]
    pub fn new(namespace: Option<CommandName>, name: CommandName) -> Self {
        Self { namespace, name }
    }

    /// Key of the value-specific handler `<name>/<action>`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `action` is not a valid segment.
    pub fn handler(&self, action: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            namespace: self.namespace.clone(),
            name: self.name.join(action)?,
        })
    }

    /// The same name in the shared root.
    #[must_use]
    pub fn shared(&self) -> Self {
        Self {
            namespace: None,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A raw captured IR/RF signal.
#[derive(Clone, PartialEq, Eq)]
pub struct Signal(Vec<u8>);

impl Signal {
    /// Wrap raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signal carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex form used on disk.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Decode the on-disk hex form; surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSignal`] if the text is not hex.
    pub fn from_hex(text: &str) -> Result<Self, ValidationError> {
        hex::decode(text.trim())
            .map(Self)
            .map_err(ValidationError::InvalidSignal)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Signal {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

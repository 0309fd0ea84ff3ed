//! INI-style gitconfig file parsing.
//!
//! Understands `[section]` and `[section "subsection"]` headers,
//! `key = value` assignments (a bare key means `true`), `#`/`;` comments,
//! double-quoted values with backslash escapes, and trailing-backslash
//! line continuation. Section and variable names are case-insensitive;
//! subsection names preserve case.

mod parse;

pub use parse::ConfigFile;

/// Errors from config parsing and value conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single parsed config entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Lowercased section name.
    pub section: String,
    /// Subsection with original case, if any.
    pub subsection: Option<String>,
    /// Lowercased variable name.
    pub name: String,
    /// Value; a bare key parses as "true".
    pub value: String,
}

impl ConfigEntry {
    /// The dotted key form: `section.name` or `section.subsection.name`.
    pub fn key(&self) -> String {
        match &self.subsection {
            Some(sub) => format!("{}.{}.{}", self.section, sub, self.name),
            None => format!("{}.{}", self.section, self.name),
        }
    }
}

use std::path::Path;

use crate::{ConfigEntry, ConfigError};

/// A parsed config file: entries in file order, last assignment winning
/// for single-value lookups.
#[derive(Debug, Default)]
pub struct ConfigFile {
    entries: Vec<ConfigEntry>,
}

impl ConfigFile {
    /// Parse a config file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse config text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        let mut section: Option<(String, Option<String>)> = None;

        // Fold continuation lines (trailing backslash) before parsing.
        let mut lines: Vec<(usize, String)> = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            if let Some((_, last)) = lines.last_mut() {
                if last.ends_with('\\') {
                    last.pop();
                    last.push_str(raw);
                    continue;
                }
            }
            lines.push((lineno + 1, raw.to_string()));
        }

        for (lineno, line) in lines {
            let line = strip_comment(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                section = Some(parse_section_header(rest, lineno)?);
                continue;
            }

            let Some((section_name, subsection)) = &section else {
                return Err(ConfigError::Parse {
                    line: lineno,
                    reason: format!("assignment outside any section: {line}"),
                });
            };

            let (name, value) = match line.split_once('=') {
                Some((name, value)) => (name.trim(), parse_value(value.trim(), lineno)?),
                // A bare key means boolean true.
                None => (line, "true".to_string()),
            };
            if name.is_empty()
                || !name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-')
                || !name.as_bytes()[0].is_ascii_alphabetic()
            {
                return Err(ConfigError::Parse {
                    line: lineno,
                    reason: format!("invalid variable name: {name}"),
                });
            }

            entries.push(ConfigEntry {
                section: section_name.clone(),
                subsection: subsection.clone(),
                name: name.to_ascii_lowercase(),
                value,
            });
        }

        Ok(Self { entries })
    }

    /// Last value assigned to `section.name` (no subsection).
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        let section = section.to_ascii_lowercase();
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .rev()
            .find(|e| e.section == section && e.subsection.is_none() && e.name == name)
            .map(|e| e.value.as_str())
    }

    /// All values for variables in `section` (any subsection), file order.
    pub fn get_section(&self, section: &str) -> Vec<&ConfigEntry> {
        let section = section.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.section == section)
            .collect()
    }

    /// `get` converted to an integer.
    pub fn get_int(&self, section: &str, name: &str) -> Result<Option<i64>, ConfigError> {
        match self.get(section, name) {
            None => Ok(None),
            Some(v) => v
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: format!("{section}.{name}"),
                    value: v.to_string(),
                }),
        }
    }

    /// `get` converted to a boolean (`true`/`yes`/`on`/`1` and friends).
    pub fn get_bool(&self, section: &str, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(section, name) {
            None => Ok(None),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" | "" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidValue {
                    key: format!("{section}.{name}"),
                    value: v.to_string(),
                }),
            },
        }
    }

    /// All entries, in file order.
    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }
}

fn parse_section_header(
    rest: &str,
    lineno: usize,
) -> Result<(String, Option<String>), ConfigError> {
    let inner = rest
        .strip_suffix(']')
        .ok_or_else(|| ConfigError::Parse {
            line: lineno,
            reason: "unterminated section header".into(),
        })?
        .trim();

    if let Some((name, quoted)) = inner.split_once(' ') {
        let quoted = quoted.trim();
        let sub = quoted
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| ConfigError::Parse {
                line: lineno,
                reason: format!("subsection must be quoted: {quoted}"),
            })?;
        Ok((
            name.to_ascii_lowercase(),
            Some(sub.replace("\\\"", "\"").replace("\\\\", "\\")),
        ))
    } else {
        Ok((inner.to_ascii_lowercase(), None))
    }
}

/// Unquote a value: strips surrounding double quotes and resolves the
/// `\"`, `\\`, `\n`, `\t` escapes.
fn parse_value(raw: &str, lineno: usize) -> Result<String, ConfigError> {
    let mut out = String::new();
    let mut chars = raw.chars();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                other => {
                    return Err(ConfigError::Parse {
                        line: lineno,
                        reason: format!("bad escape: \\{}", other.unwrap_or(' ')),
                    })
                }
            },
            c => out.push(c),
        }
    }
    if in_quotes {
        return Err(ConfigError::Parse {
            line: lineno,
            reason: "unterminated quote".into(),
        });
    }
    Ok(out)
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' | ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

//! Section-based configuration loader.
//!
//! The file is INI-like: `[name]` headers followed by `key = value` lines.
//! Each section describes one backend query and the directory its results
//! are linked into.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::downloader::utils::expand_tilde;

/// Used when a section does not set `max_results`
pub const DEFAULT_MAX_RESULTS: usize = 10;

const SYSTEM_CONFIG: &str = "/etc/vidlink.conf";
const USER_CONFIG: &str = ".vidlink.conf";

const KNOWN_KEYS: &[&str] = &[
    "backend",
    "pattern",
    "title_exclude",
    "id_regexp",
    "max_results",
    "directory",
];

lazy_static! {
    static ref SECTION_RE: Regex = Regex::new(r"^\[\s*([^\]]*?)\s*\]$").unwrap();
    static ref KEY_VALUE_RE: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_.-]*)\s*[=:]\s*(.*)$").unwrap();
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found (looked in: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path}:{line}: section [{name}] already defined at line {first}")]
    DuplicateSection {
        path: PathBuf,
        name: String,
        first: usize,
        line: usize,
    },

    #[error("{path}: section [{section}] is missing required key '{key}'")]
    MissingKey {
        path: PathBuf,
        section: String,
        key: &'static str,
    },

    #[error("{path}: section [{section}]: max_results must be a positive integer, got '{value}'")]
    InvalidMaxResults {
        path: PathBuf,
        section: String,
        value: String,
    },

    #[error("{path}: section [{section}]: malformed id_regexp: {source}")]
    InvalidIdRegexp {
        path: PathBuf,
        section: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown section(s): {}", .names.join(", "))]
    UnknownSections { names: Vec<String> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One named query block
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub backend: String,
    pub pattern: String,
    /// Matched case-insensitively, stored lowercased
    pub title_exclude: Vec<String>,
    /// Anchored: ids must match the whole pattern
    pub id_regexp: Option<Regex>,
    pub max_results: usize,
    pub directory: PathBuf,
}

/// A parsed configuration file, sections in file order
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub sections: Vec<Section>,
}

/// Candidate locations checked when no path is given on the command line
pub fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(USER_CONFIG));
    }
    paths
}

/// Pick the config file: the explicit one, or the first existing candidate
pub fn locate(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::NotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            searched: candidates.to_vec(),
        })
}

struct RawSection {
    name: String,
    line: usize,
    values: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse config text; `path` is only used in error messages
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut raw: Vec<RawSection> = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(caps) = SECTION_RE.captures(line) {
                let name = caps[1].to_string();
                if name.is_empty() {
                    return Err(syntax(path, lineno, "empty section name"));
                }
                if let Some(prev) = raw.iter().find(|s| s.name == name) {
                    return Err(ConfigError::DuplicateSection {
                        path: path.to_path_buf(),
                        name,
                        first: prev.line,
                        line: lineno,
                    });
                }
                raw.push(RawSection {
                    name,
                    line: lineno,
                    values: HashMap::new(),
                });
                continue;
            }

            let Some(caps) = KEY_VALUE_RE.captures(line) else {
                return Err(syntax(path, lineno, &format!("cannot parse line '{}'", line)));
            };
            let Some(current) = raw.last_mut() else {
                return Err(syntax(path, lineno, "key outside of any section"));
            };

            let key = caps[1].to_lowercase();
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(
                    "[config] {}:{}: ignoring unknown key '{}' in [{}]",
                    path.display(),
                    lineno,
                    key,
                    current.name
                );
                continue;
            }
            current.values.insert(key, caps[2].trim().to_string());
        }

        let sections = raw
            .into_iter()
            .map(|r| build_section(r, path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Restrict to the named sections, or all of them when `names` is empty.
    /// Every unknown name is reported at once.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Section>, ConfigError> {
        if names.is_empty() {
            return Ok(self.sections.iter().collect());
        }

        let unknown: Vec<String> = names
            .iter()
            .filter(|n| self.section(n).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownSections { names: unknown });
        }

        let mut selected: Vec<&Section> = Vec::new();
        for name in names {
            if let Some(section) = self.section(name) {
                if !selected.iter().any(|s| s.name == section.name) {
                    selected.push(section);
                }
            }
        }
        Ok(selected)
    }
}

fn syntax(path: &Path, line: usize, message: &str) -> ConfigError {
    ConfigError::Syntax {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

fn build_section(raw: RawSection, path: &Path) -> Result<Section, ConfigError> {
    let RawSection { name, mut values, .. } = raw;

    let mut required = |key: &'static str| -> Result<String, ConfigError> {
        match values.remove(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ConfigError::MissingKey {
                path: path.to_path_buf(),
                section: name.clone(),
                key,
            }),
        }
    };

    let backend = required("backend")?;
    let pattern = required("pattern")?;
    let directory = expand_tilde(&required("directory")?);

    let max_results = match values.remove("max_results") {
        None => DEFAULT_MAX_RESULTS,
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(ConfigError::InvalidMaxResults {
                    path: path.to_path_buf(),
                    section: name,
                    value,
                })
            }
        },
    };

    let id_regexp = match values.remove("id_regexp") {
        Some(p) if !p.is_empty() => {
            Some(
                Regex::new(&format!("^(?:{})$", p)).map_err(|source| {
                    ConfigError::InvalidIdRegexp {
                        path: path.to_path_buf(),
                        section: name.clone(),
                        source,
                    }
                })?,
            )
        }
        _ => None,
    };

    let title_exclude = values
        .remove("title_exclude")
        .map(|v| {
            v.split('|')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Section {
        name,
        backend,
        pattern,
        title_exclude,
        id_regexp,
        max_results,
        directory,
    })
}

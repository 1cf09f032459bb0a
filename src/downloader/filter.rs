// Filter stage: title exclusion, id inclusion, result cap

use futures::future;
use futures::StreamExt;
use regex::Regex;

use super::models::{RecordStream, VideoRecord};
use crate::config::Section;

#[derive(Debug, Clone)]
pub struct Filter {
    /// Lowercased substrings; a title containing any of them is dropped
    title_exclude: Vec<String>,
    /// Anchored pattern the whole id must match
    id_regexp: Option<Regex>,
    /// Cap on records pulled from the backend, applied before filtering
    max_results: usize,
}

impl Filter {
    pub fn new(title_exclude: Vec<String>, id_regexp: Option<Regex>, max_results: usize) -> Self {
        Self {
            title_exclude: title_exclude.into_iter().map(|t| t.to_lowercase()).collect(),
            id_regexp,
            max_results,
        }
    }

    pub fn from_section(section: &Section) -> Self {
        Self::new(
            section.title_exclude.clone(),
            section.id_regexp.clone(),
            section.max_results,
        )
    }

    pub fn excluded_by_title(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.title_exclude.iter().any(|t| title.contains(t.as_str()))
    }

    pub fn id_allowed(&self, id: &str) -> bool {
        self.id_regexp.as_ref().map_or(true, |re| re.is_match(id))
    }

    pub fn accepts(&self, record: &VideoRecord) -> bool {
        !self.excluded_by_title(&record.title) && self.id_allowed(&record.id)
    }

    /// Wrap a backend stream. Errors pass through untouched so the caller
    /// decides what a failed search means.
    pub fn apply(&self, records: RecordStream) -> RecordStream {
        let filter = self.clone();
        Box::pin(records.take(self.max_results).filter(move |item| {
            let keep = match item {
                Ok(record) => {
                    let keep = filter.accepts(record);
                    if !keep {
                        tracing::debug!("[filter] skipping {} ({})", record.id, record.title);
                    }
                    keep
                }
                Err(_) => true,
            };
            future::ready(keep)
        }))
    }
}

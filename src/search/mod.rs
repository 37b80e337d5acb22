use std::collections::BTreeSet;

use crate::storage::Note;

/// The three list filters. All active filters must hold for a note to be visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    pub search_text: String,
    pub selected_tag: Option<String>,
    pub pinned_only: bool,
}

impl NoteFilter {
    pub fn is_active(&self) -> bool {
        self.pinned_only || self.selected_tag.is_some() || !self.search_text.is_empty()
    }

    pub fn matches(&self, note: &Note) -> bool {
        if self.pinned_only && !note.is_pinned {
            return false;
        }
        if let Some(tag) = &self.selected_tag {
            if !note.tags.iter().any(|candidate| candidate == tag) {
                return false;
            }
        }
        if !self.search_text.is_empty() {
            let haystack = format!("{}{}", note.title, note.body()).to_lowercase();
            if !haystack.contains(&self.search_text.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Keeps matching notes in their original order.
    pub fn apply<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        notes.iter().filter(|note| self.matches(note)).collect()
    }

    /// Short labels for the filters that are switched on, for the status strip.
    pub fn chips(&self) -> Vec<String> {
        let mut chips = Vec::new();
        if self.pinned_only {
            chips.push("pinned".to_string());
        }
        if let Some(tag) = &self.selected_tag {
            chips.push(format!("#{tag}"));
        }
        if !self.search_text.is_empty() {
            chips.push(format!("\"{}\"", self.search_text));
        }
        chips
    }
}

pub fn unique_tags(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .flat_map(|note| note.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Splits a comma separated tag field. Pieces are trimmed and empty ones
/// dropped; order and duplicates are kept.
pub fn parse_tag_field(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn format_tag_field(tags: &[String]) -> String {
    tags.join(", ")
}


#[cfg(test)]
mod tests {
    use super::fixtures::note;
    use super::*;

    fn titles(notes: Vec<&Note>) -> Vec<&str> {
        notes.into_iter().map(|note| note.title.as_str()).collect()
    }

    fn collection() -> Vec<Note> {
        vec![
            note("Roadmap", "Ship the Rust port", &["work", "rust"], true, 10),
            note("Groceries", "Apples\nMilk", &["personal"], false, 20),
            note("Journal", "Felt good", &["life", "journal"], false, 30),
            note("Standup", "Rust team sync", &["work"], false, 40),
        ]
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_content() {
        let notes = vec![
            note("Groceries", "Apples\nMilk", &[], false, 0),
            note("Journal", "Felt good", &[], false, 0),
        ];
        for needle in ["apples", "APPLES", "aPpLeS"] {
            let filter = NoteFilter {
                search_text: needle.into(),
                ..NoteFilter::default()
            };
            assert_eq!(titles(filter.apply(&notes)), vec!["Groceries"]);
        }
    }

    #[test]
    fn search_spans_the_title_content_boundary() {
        let notes = vec![note("Road", "map", &[], false, 0)];
        let filter = NoteFilter {
            search_text: "roadmap".into(),
            ..NoteFilter::default()
        };
        assert_eq!(filter.apply(&notes).len(), 1);
    }

    #[test]
    fn tag_filter_is_exact_and_case_sensitive() {
        let notes = collection();
        let filter = NoteFilter {
            selected_tag: Some("work".into()),
            ..NoteFilter::default()
        };
        assert_eq!(titles(filter.apply(&notes)), vec!["Roadmap", "Standup"]);

        let filter = NoteFilter {
            selected_tag: Some("Work".into()),
            ..NoteFilter::default()
        };
        assert!(filter.apply(&notes).is_empty());
    }

    #[test]
    fn filters_combine_conjunctively_and_keep_order() {
        let notes = collection();
        let filter = NoteFilter {
            search_text: "rust".into(),
            selected_tag: Some("work".into()),
            pinned_only: false,
        };
        assert_eq!(titles(filter.apply(&notes)), vec!["Roadmap", "Standup"]);

        let filter = NoteFilter {
            pinned_only: true,
            ..filter
        };
        assert_eq!(titles(filter.apply(&notes)), vec!["Roadmap"]);

        for filter in [
            NoteFilter::default(),
            NoteFilter {
                search_text: "o".into(),
                selected_tag: Some("life".into()),
                pinned_only: false,
            },
            NoteFilter {
                search_text: "zzz".into(),
                ..NoteFilter::default()
            },
        ] {
            let visible = filter.apply(&notes);
            assert!(visible.iter().all(|note| filter.matches(note)));
            let positions: Vec<_> = visible
                .iter()
                .map(|v| notes.iter().position(|n| n.id == v.id).expect("subset"))
                .collect();
            assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn unique_tags_are_deduplicated_and_sorted() {
        let mut notes = collection();
        notes.push(note("Dup", "", &["work", "Alpha", "work"], false, 50));
        assert_eq!(
            unique_tags(&notes),
            vec!["Alpha", "journal", "life", "personal", "rust", "work"]
        );
    }

    #[test]
    fn tag_field_parsing_trims_and_drops_empties() {
        assert_eq!(
            parse_tag_field("swift, journal ,  , life"),
            vec!["swift", "journal", "life"]
        );
        assert_eq!(parse_tag_field("a, a ,b"), vec!["a", "a", "b"]);
        assert!(parse_tag_field(" , ,").is_empty());
        assert_eq!(
            parse_tag_field(&format_tag_field(&parse_tag_field("x ,y"))),
            vec!["x", "y"]
        );
    }

    #[test]
    fn chips_describe_active_filters() {
        let filter = NoteFilter {
            search_text: "milk".into(),
            selected_tag: Some("personal".into()),
            pinned_only: true,
        };
        assert!(filter.is_active());
        assert_eq!(filter.chips(), vec!["pinned", "#personal", "\"milk\""]);
        assert!(NoteFilter::default().chips().is_empty());
    }
}

//! Name classification against ordered pattern grammars.
//!
//! A [`Classifier`] holds a fixed, ordered set of grammars (compiled regexes
//! with named capture fields). Classification is a pure function of the input
//! string: grammars are tried in declared order and the first match wins.
//! This ordering is what distinguishes the canonical form
//! `name (year) - extra [tmdbid=id]` from the out-of-order form
//! `name (year) [tmdbid=id] - extra` — the latter still matches, but is
//! flagged so that validation can treat it specially.
//!
//! # Examples
//!
//! ```
//! use mediatidy::classifier::{Classification, Classifier};
//!
//! let classifier = Classifier::movie_directories();
//! match classifier.classify("Alien (1979) - Director's Cut [tmdbid=348]") {
//!     Classification::Match(info) => {
//!         assert_eq!(info.fields["name"], "Alien");
//!         assert_eq!(info.fields["year"], "1979");
//!         assert!(!info.out_of_order);
//!     }
//!     Classification::NoMatch => panic!("expected a match"),
//! }
//! ```

use regex::Regex;
use std::collections::BTreeMap;

/// A single naming grammar: a compiled pattern plus metadata about how a
/// match should be interpreted.
struct Grammar {
    /// Short identifier used in diagnostics.
    name: &'static str,
    regex: Regex,
    /// True when a match is technically valid but the fields appear in the
    /// wrong order relative to the canonical form.
    out_of_order: bool,
    /// Capture names that must parse as unsigned integers. A parse failure
    /// demotes the match to a `NoMatch` for this grammar only.
    numeric_fields: &'static [&'static str],
}

/// Extracted fields from a successful grammar match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    /// Name of the grammar that matched first.
    pub grammar: &'static str,
    /// True when the matching grammar is an out-of-order variant.
    pub out_of_order: bool,
    /// Capture-name → trimmed value. Empty captures are omitted.
    pub fields: BTreeMap<String, String>,
}

/// Result of classifying a single leaf name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No grammar in the set matched.
    NoMatch,
    /// The first matching grammar, with its extracted fields.
    Match(MatchInfo),
}

impl Classification {
    /// Returns the match info, if any.
    pub fn as_match(&self) -> Option<&MatchInfo> {
        match self {
            Classification::Match(info) => Some(info),
            Classification::NoMatch => None,
        }
    }
}

/// An ordered grammar set. Construction compiles every pattern once;
/// classification performs no allocation beyond the extracted fields.
pub struct Classifier {
    grammars: Vec<Grammar>,
}

/// Width used when re-rendering numeric ordinals into canonical names.
const ORDINAL_WIDTH: usize = 2;

impl Classifier {
    /// Grammar set for movie directory names.
    ///
    /// Declared order (first match wins):
    /// 1. `canonical`      — `name (year) - extra [tmdbid=id]`
    /// 2. `out-of-order`   — `name (year) [tmdbid=id] - extra` (flagged)
    /// 3. `base`           — `name (year) [tmdbid=id]` (no extra info)
    ///
    /// Both `tmdbid` and `imdbid` tags are recognized; the tag itself is
    /// captured as the `tag` field so renames preserve it.
    pub fn movie_directories() -> Self {
        Self {
            grammars: vec![
                Grammar {
                    name: "canonical",
                    regex: Regex::new(
                        r"^(?P<name>.*?)\s+\((?P<year>\d{4})\)\s*-\s*(?P<extra>.*?)\s*\[(?P<tag>tmdbid|imdbid)=\s*(?P<id>[^\]]*?)\s*\]$",
                    )
                    .expect("invalid canonical grammar"),
                    out_of_order: false,
                    numeric_fields: &[],
                },
                Grammar {
                    name: "out-of-order",
                    regex: Regex::new(
                        r"^(?P<name>.*?)\s+\((?P<year>\d{4})\)\s*\[(?P<tag>tmdbid|imdbid)=\s*(?P<id>[^\]]*?)\s*\]\s*-\s*(?P<extra>.*?)\s*$",
                    )
                    .expect("invalid out-of-order grammar"),
                    out_of_order: true,
                    numeric_fields: &[],
                },
                Grammar {
                    name: "base",
                    regex: Regex::new(
                        r"^(?P<name>.*?)\s+\((?P<year>\d{4})\)\s*\[(?P<tag>tmdbid|imdbid)=\s*(?P<id>[^\]]*?)\s*\]$",
                    )
                    .expect("invalid base grammar"),
                    out_of_order: false,
                    numeric_fields: &[],
                },
            ],
        }
    }

    /// Grammar set for extracting a group key (external id) from a directory
    /// name. Looser than the movie grammars: anything carrying an id tag
    /// after a parenthesized segment groups under that id.
    pub fn group_keys() -> Self {
        Self {
            grammars: vec![Grammar {
                name: "group-key",
                regex: Regex::new(
                    r"^(?P<name>.*?)\s+\(.*\[(?P<tag>tmdbid|imdbid)=\s*(?P<id>[^\]]*?)\s*\]",
                )
                .expect("invalid group-key grammar"),
                out_of_order: false,
                numeric_fields: &[],
            }],
        }
    }

    /// Grammar for `NN - name` ordinal-prefixed file names. The ordinal is a
    /// numeric field: a prefix that fails to parse as `u32` is a `NoMatch`.
    pub fn tracks() -> Self {
        Self {
            grammars: vec![Grammar {
                name: "track",
                regex: Regex::new(r"^(?P<track>\d+)\s*-\s*(?P<name>.*)$")
                    .expect("invalid track grammar"),
                out_of_order: false,
                numeric_fields: &["track"],
            }],
        }
    }

    /// Classifies a leaf name against the grammar set.
    ///
    /// Pure and deterministic: no filesystem access, no side effects, the
    /// same input always yields the same result. The empty string never
    /// matches. Multiple simultaneous matches are resolved by grammar
    /// priority, not by match length.
    pub fn classify(&self, leaf: &str) -> Classification {
        if leaf.is_empty() {
            return Classification::NoMatch;
        }
        for grammar in &self.grammars {
            let Some(captures) = grammar.regex.captures(leaf) else {
                continue;
            };

            let mut fields = BTreeMap::new();
            let mut numeric_ok = true;
            for capture_name in grammar.regex.capture_names().flatten() {
                let Some(value) = captures.name(capture_name) else {
                    continue;
                };
                let value = value.as_str().trim();
                if grammar.numeric_fields.contains(&capture_name)
                    && value.parse::<u32>().is_err()
                {
                    numeric_ok = false;
                    break;
                }
                if !value.is_empty() {
                    fields.insert(capture_name.to_string(), value.to_string());
                }
            }
            if !numeric_ok {
                // Fall through to the next grammar rather than failing.
                continue;
            }
            return Classification::Match(MatchInfo {
                grammar: grammar.name,
                out_of_order: grammar.out_of_order,
                fields,
            });
        }
        Classification::NoMatch
    }
}

/// Renders the canonical base name expected of the single file inside a
/// directory classified with `name` and `extra` fields: `"{name} - {extra}"`.
///
/// Returns `None` when the directory carries no extra info (base form), in
/// which case no child-name constraint applies.
pub fn canonical_child_base(fields: &BTreeMap<String, String>) -> Option<String> {
    let name = fields.get("name")?;
    let extra = fields.get("extra")?;
    Some(format!("{} - {}", name, extra))
}

/// The tighter accepted variant of the child base name: `"{name}-{extra}"`.
/// Accepted by validation but never produced when renaming.
pub fn compact_child_base(fields: &BTreeMap<String, String>) -> Option<String> {
    let name = fields.get("name")?;
    let extra = fields.get("extra")?;
    Some(format!("{}-{}", name, extra))
}

/// Renders the canonical directory name from extracted fields, in canonical
/// field order regardless of which grammar produced them:
/// `name (year) - extra [tag=id]`, with the `- extra` segment omitted when
/// absent. Returns `None` when the mandatory fields are missing.
pub fn canonical_directory_name(fields: &BTreeMap<String, String>) -> Option<String> {
    let name = fields.get("name")?;
    let year = fields.get("year")?;
    let tag = fields.get("tag").map(String::as_str).unwrap_or("tmdbid");
    let id = fields.get("id")?;
    Some(match fields.get("extra") {
        Some(extra) => format!("{} ({}) - {} [{}={}]", name, year, extra, tag, id),
        None => format!("{} ({}) [{}={}]", name, year, tag, id),
    })
}

/// Renders a canonical ordinal-prefixed name with the ordinal zero-padded to
/// a fixed width: `"01 - name"`.
pub fn canonical_track_name(track: u32, name: &str) -> String {
    format!("{:0width$} - {}", track, name, width = ORDINAL_WIDTH)
}

/// True when the name contains a run of two or more consecutive interior
/// whitespace characters. Such names are malformed regardless of grammar.
pub fn has_doubled_spaces(name: &str) -> bool {
    name.as_bytes()
        .windows(2)
        .any(|pair| pair[0].is_ascii_whitespace() && pair[1].is_ascii_whitespace())
}

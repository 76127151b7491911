use lazycell::LazyCell;
use log::warn;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Language-conversion flag names and their single-letter codes as they
/// appear inside `-{...}-` constructs.
pub static LC_NAME_MAP: &[(&str, &str)] = &[
    ("describe", "D"),
    ("add", "A"),
    ("hidden", "H"),
    ("showflag", "$S"),
    ("title", "T"),
    ("remove", "R"),
    ("-", "-"),
];

/// Read-only site configuration. Shared by every transformation of the
/// environment; never mutated after construction.
pub struct SiteConfig {
    /// Behavior-switch magic words by page-property key, mapped to their
    /// canonical source form (`notoc` -> `__NOTOC__`).
    magic_words: HashMap<String, String>,
    /// Page properties that masquerade as parser functions
    /// (`categorydefaultsort` -> `defaultsort`).
    magic_word_masq: HashMap<String, String>,
    /// Case-folded index over `magic_words`, built on first use.
    magic_word_index: LazyCell<HashMap<String, String>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let mut magic_words = HashMap::new();

        for &(key, src) in &[
            ("notoc", "__NOTOC__"),
            ("forcetoc", "__FORCETOC__"),
            ("toc", "__TOC__"),
            ("noeditsection", "__NOEDITSECTION__"),
            ("nogallery", "__NOGALLERY__"),
            ("hiddencat", "__HIDDENCAT__"),
            ("index", "__INDEX__"),
            ("noindex", "__NOINDEX__"),
            ("newsectionlink", "__NEWSECTIONLINK__"),
            ("nonewsectionlink", "__NONEWSECTIONLINK__"),
            ("staticredirect", "__STATICREDIRECT__"),
            ("nocontentconvert", "__NOCONTENTCONVERT__"),
            ("notitleconvert", "__NOTITLECONVERT__"),
        ] {
            magic_words.insert(key.to_string(), src.to_string());
        }

        let mut magic_word_masq = HashMap::new();

        magic_word_masq.insert("categorydefaultsort".to_string(), "defaultsort".to_string());
        magic_word_masq.insert("displaytitle".to_string(), "displaytitle".to_string());

        SiteConfig {
            magic_words,
            magic_word_masq,
            magic_word_index: LazyCell::new(),
        }
    }
}

impl SiteConfig {
    /// Canonical source form for a behavior-switch page property, if the
    /// site registers one.
    pub fn magic_word_source(&self, key: &str) -> Option<&str> {
        let index = self.magic_word_index.borrow_with(|| {
            self.magic_words
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect()
        });

        index.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// The magic word a page property masquerades as, e.g.
    /// `categorydefaultsort` -> `defaultsort`.
    pub fn magic_word_masq(&self, key: &str) -> Option<&str> {
        self.magic_word_masq
            .get(&key.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Registers or overrides a behavior-switch magic word.
    pub fn register_magic_word(&mut self, key: impl Into<String>, src: impl Into<String>) {
        assert!(
            !self.magic_word_index.filled(),
            "Site config mutated after first use."
        );

        self.magic_words.insert(key.into(), src.into());
    }

    /// Single-letter code of a language-conversion flag name.
    pub fn lc_flag_code(&self, name: &str) -> Option<&'static str> {
        LC_NAME_MAP
            .iter()
            .find(|&&(n, _)| n == name)
            .map(|&(_, code)| code)
    }
}

/// A warning destined for the host's linter data channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LintEntry {
    pub component: &'static str,
    pub message: String,
}

/// Per-environment state shared by every stage of a transformation:
/// site configuration, the monotonic about-ID allocator and the
/// warning/linter channel. Passed as an explicit dependency, never
/// reached through ambient globals.
pub struct Env {
    site: SiteConfig,
    about_id_counter: AtomicU32,
    lints: RefCell<Vec<LintEntry>>,
}

impl Default for Env {
    fn default() -> Self {
        Env::new(SiteConfig::default())
    }
}

impl Env {
    pub fn new(site: SiteConfig) -> Self {
        Env {
            site,
            about_id_counter: AtomicU32::new(0),
            lints: RefCell::new(Vec::new()),
        }
    }

    #[inline]
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Allocates the next `#mwtN` encapsulation ID. Monotonic within the
    /// environment; environments are per-transformation-host, which keeps
    /// IDs reproducible for a given document.
    #[inline]
    pub fn new_about_id(&self) -> String {
        let id = self.about_id_counter.fetch_add(1, Ordering::Relaxed) + 1;

        format!("#mwt{}", id)
    }

    /// Logs an ordinary-input problem and records it for the linter
    /// channel. Never fails the transformation.
    pub fn warn(&self, component: &'static str, message: impl Into<String>) {
        let message = message.into();

        warn!("{}: {}", component, message);

        self.lints.borrow_mut().push(LintEntry { component, message });
    }

    /// Drains the collected warnings, ready to be handed to the host's
    /// `logLinterData` endpoint.
    pub fn take_linter_data(&self) -> Vec<LintEntry> {
        self.lints.borrow_mut().split_off(0)
    }
}

//! Bracketed body directives: `[category news travel]`, `[tag a b]`,
//! `[pin 1234]`, `[post-format gallery]` and one per registered custom
//! taxonomy.
//!
//! One pattern builder serves both lookup and stripping, so the two can
//! never disagree about what a shortcode looks like.

use regex::Regex;
use tracing::warn;

/// Shortcode names every site understands.
pub const BUILTIN: [&str; 4] = ["tag", "category", "pin", "post-format"];

/// `[name args...]`, case-insensitive. The name must be followed by
/// whitespace, so `[categoryX a]` is not a `category` shortcode.
fn pattern(name: &str) -> Option<Regex> {
    let source = format!(r"(?i)\[{}\s(.*?)\]", regex::escape(name));
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(name, error = %e, "Unusable shortcode name");
            None
        }
    }
}

fn tokens(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Arguments of the first `[name ...]` in `text`, split on whitespace.
///
/// Later occurrences are ignored. Returns an empty list when the shortcode
/// is absent.
pub fn find(name: &str, text: &str) -> Vec<String> {
    pattern(name)
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| tokens(m.as_str()))
        .unwrap_or_default()
}

/// Remove every occurrence of every shortcode in `names`.
///
/// Brackets with other names are left alone.
pub fn strip_known<S: AsRef<str>>(text: &str, names: &[S]) -> String {
    names.iter().fold(text.to_string(), |acc, name| {
        match pattern(name.as_ref()) {
            Some(re) => re.replace_all(&acc, "").into_owned(),
            None => acc,
        }
    })
}

/// The builtin names followed by `taxonomies`.
pub fn known_names(taxonomies: &[String]) -> Vec<String> {
    BUILTIN
        .iter()
        .map(|s| s.to_string())
        .chain(taxonomies.iter().cloned())
        .collect()
}

/// One extracted directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
    pub name: String,
    pub args: Vec<String>,
}

/// The first occurrence of each requested shortcode, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcodeSet {
    entries: Vec<Shortcode>,
}

impl ShortcodeSet {
    /// Look up each of `names` in `text`. Names without a match are left out.
    pub fn extract<S: AsRef<str>>(text: &str, names: &[S]) -> Self {
        let entries = names
            .iter()
            .filter_map(|name| {
                let re = pattern(name.as_ref())?;
                let args = re.captures(text)?.get(1).map(|m| tokens(m.as_str()))?;
                Some(Shortcode {
                    name: name.as_ref().to_string(),
                    args,
                })
            })
            .collect();
        Self { entries }
    }

    /// Arguments for `name`, empty when it was not present.
    pub fn get(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.args.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shortcode> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Keyword rules that classify files by folder and file names.

use std::sync::OnceLock;

use regex::Regex;

use arbor_core::Category;

/// One rule: every keyword group must match, a group matches when any of its
/// alternatives is a substring of the folded name.
struct Rule {
    category: Category,
    groups: &'static [&'static [&'static str]],
}

impl Rule {
    fn matches(&self, folded: &str) -> bool {
        self.groups
            .iter()
            .all(|alternatives| alternatives.iter().any(|kw| folded.contains(kw)))
    }
}

static DEFAULT_RULES: &[Rule] = &[
    Rule {
        category: Category::QuickGuide,
        groups: &[&["guia"], &["rapido"]],
    },
    Rule {
        category: Category::PracticalGuide,
        groups: &[&["guia"], &["pratico"]],
    },
    Rule {
        category: Category::Announcement,
        groups: &[&["comunicado"]],
    },
    Rule {
        category: Category::FrontLine,
        groups: &[&["linha"], &["frente"]],
    },
    Rule {
        category: Category::Assistance,
        groups: &[&["assistencia"]],
    },
    Rule {
        category: Category::Insurance,
        groups: &[&["seguro", "segurador"]],
    },
];

/// Ordered category rules. The first rule that matches any ancestor folder
/// name wins; only when no rule matches a folder is the file name tried.
#[derive(Clone, Copy)]
pub struct CategoryRules {
    rules: &'static [Rule],
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES,
        }
    }
}

impl std::fmt::Debug for CategoryRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.category))
            .finish()
    }
}

impl CategoryRules {
    pub fn classify(&self, folder_path: &[String], file_name: &str) -> Category {
        let folders: Vec<String> = folder_path.iter().map(|f| fold(f)).collect();
        for rule in self.rules {
            if folders.iter().any(|f| rule.matches(f)) {
                return rule.category;
            }
        }
        let name = fold(file_name);
        self.rules
            .iter()
            .find(|rule| rule.matches(&name))
            .map_or(Category::Uncategorized, |rule| rule.category)
    }
}

/// Lowercase and drop Portuguese diacritics so `Rápido` matches `rapido`.
pub fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?:^|[^\d])(\d{1,2}[-_.]\d{1,2}(?:[-_.]\d{2,4})?)(?:[^\d]|$)").ok()
        })
        .as_ref()
}

/// First plausible `dd-mm[-yyyy]` token of an announcement file name.
pub fn notice_date(file_name: &str) -> Option<String> {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    date_pattern()?
        .captures_iter(stem)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|token| {
            let mut parts = token.split(['-', '_', '.']);
            let day: u32 = parts.next().and_then(|d| d.parse().ok()).unwrap_or(0);
            let month: u32 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
            (1..=31).contains(&day) && (1..=12).contains(&month)
        })
        .map(str::to_string)
}

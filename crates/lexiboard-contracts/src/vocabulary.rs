use serde::{Deserialize, Serialize};

/// A poster vocabulary, bucketed into the three fixed categories the prompt
/// template and the text API both speak.
///
/// Every entry is a single bilingual string of the form `"<english> <chinese>"`.
/// The chinese half is always the last whitespace-delimited token; the english
/// half is everything before it, which allows multi-word English terms
/// (`"shopping cart 购物车"`). Downstream prompt assembly depends on this
/// convention, so [`split_entry`]/[`join_entry`] must round-trip exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyList {
    #[serde(default)]
    pub core: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Core,
    Items,
    Environment,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Core, Category::Items, Category::Environment];

    /// The Chinese category key used by the text API contract and the prompt
    /// template.
    pub fn label(self) -> &'static str {
        match self {
            Category::Core => "核心",
            Category::Items => "物品",
            Category::Environment => "环境",
        }
    }

    /// English heading used on the CLI surface.
    pub fn heading(self) -> &'static str {
        match self {
            Category::Core => "core roles & fixtures",
            Category::Items => "common items & tools",
            Category::Environment => "environment & decor",
        }
    }

    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.label() == label.trim())
    }
}

impl VocabularyList {
    pub fn category(&self, category: Category) -> &[String] {
        match category {
            Category::Core => &self.core,
            Category::Items => &self.items,
            Category::Environment => &self.environment,
        }
    }

    pub fn category_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Core => &mut self.core,
            Category::Items => &mut self.items,
            Category::Environment => &mut self.environment,
        }
    }

    /// A list is complete when every category holds at least one word.
    pub fn is_complete(&self) -> bool {
        Category::ALL
            .into_iter()
            .all(|category| !self.category(category).is_empty())
    }

    pub fn word_count(&self) -> usize {
        Category::ALL
            .into_iter()
            .map(|category| self.category(category).len())
            .sum()
    }

    /// Canonicalizes every entry: english lowercased, single-space joined.
    /// Entries that carry no recognizable bilingual pair are left untouched.
    pub fn normalize(&mut self) {
        for category in Category::ALL {
            for entry in self.category_mut(category) {
                if let Some((english, chinese)) = split_entry(entry) {
                    *entry = join_entry(&english.to_lowercase(), &chinese);
                }
            }
        }
    }
}

/// Splits a bilingual entry into `(english, chinese)`.
///
/// The chinese half is the last whitespace-delimited token; the english half
/// is everything before it joined with single spaces. Returns `None` for
/// blank input. A single-token entry yields an empty english half, matching
/// the display contract.
pub fn split_entry(entry: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = entry.split_whitespace().collect();
    let (chinese, english) = tokens.split_last()?;
    Some((english.join(" "), (*chinese).to_string()))
}

/// Rejoins a split entry; the exact inverse of [`split_entry`] for canonical
/// single-space entries.
pub fn join_entry(english: &str, chinese: &str) -> String {
    if english.is_empty() {
        return chinese.to_string();
    }
    format!("{english} {chinese}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_entry_keeps_multi_word_english() {
        let (english, chinese) = split_entry("ice cream 冰淇淋").expect("splits");
        assert_eq!(english, "ice cream");
        assert_eq!(chinese, "冰淇淋");
    }

    #[test]
    fn split_then_join_round_trips_exactly() {
        for entry in ["ice cream 冰淇淋", "cashier 收银员", "checkout counter 收银台"] {
            let (english, chinese) = split_entry(entry).expect("splits");
            assert_eq!(join_entry(&english, &chinese), entry);
        }
    }

    #[test]
    fn split_entry_handles_single_token() {
        let (english, chinese) = split_entry("苹果").expect("splits");
        assert_eq!(english, "");
        assert_eq!(chinese, "苹果");
        assert_eq!(join_entry(&english, &chinese), "苹果");
    }

    #[test]
    fn split_entry_rejects_blank_input() {
        assert!(split_entry("").is_none());
        assert!(split_entry("   ").is_none());
    }

    #[test]
    fn normalize_lowercases_english_only() {
        let mut list = VocabularyList {
            core: vec!["Shopping Cart 购物车".to_string()],
            items: vec!["APPLE 苹果".to_string()],
            environment: vec!["exit 出口".to_string()],
        };
        list.normalize();
        assert_eq!(list.core, vec!["shopping cart 购物车"]);
        assert_eq!(list.items, vec!["apple 苹果"]);
        assert_eq!(list.environment, vec!["exit 出口"]);
    }

    #[test]
    fn is_complete_requires_every_category() {
        let mut list = VocabularyList::default();
        assert!(!list.is_complete());
        list.core.push("teacher 老师".to_string());
        list.items.push("book 书".to_string());
        assert!(!list.is_complete());
        list.environment.push("flag 国旗".to_string());
        assert!(list.is_complete());
        assert_eq!(list.word_count(), 3);
    }

    #[test]
    fn category_label_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_label(category.label()), Some(category));
        }
        assert_eq!(Category::from_label("其他"), None);
    }
}

//! Category assignment
//!
//! Rule-priority dispatch over an ordered list of tagged match predicates.
//! User overrides win unconditionally; among rule matches the most specific
//! one (longest pattern) wins, ties broken by earliest-defined rule.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use crate::models::{Category, MatchPattern, Transaction, UNCATEGORIZED};

/// One compiled predicate, retaining its category and definition order
struct CompiledRule {
    category_index: usize,
    specificity: usize,
    /// Position in the flattened rule list; earlier wins ties
    order: usize,
    matcher: Matcher,
    min_amount_minor: Option<i64>,
    max_amount_minor: Option<i64>,
}

enum Matcher {
    Substring(String),
    Regex(Regex),
}

/// Assigns categories to transactions from the registry snapshot.
///
/// Compiled once per job run; category and rule order is the priority order.
pub struct Categorizer {
    categories: Vec<String>,
    rules: Vec<CompiledRule>,
}

impl Categorizer {
    /// Build a categorizer from a registry snapshot.
    ///
    /// A rule with an invalid regex is dropped with a warning rather than
    /// failing the whole registry; the remaining rules still apply.
    pub fn new(categories: &[Category]) -> Self {
        let mut names = Vec::with_capacity(categories.len());
        let mut rules = Vec::new();
        let mut order = 0usize;

        for (category_index, category) in categories.iter().enumerate() {
            names.push(category.name.clone());
            for rule in &category.rules {
                let matcher = match &rule.pattern {
                    MatchPattern::Substring(s) => Matcher::Substring(s.to_uppercase()),
                    MatchPattern::Regex(pattern) => match Regex::new(pattern) {
                        Ok(re) => Matcher::Regex(re),
                        Err(e) => {
                            warn!(
                                "Dropping invalid regex rule {:?} for category {}: {}",
                                pattern, category.name, e
                            );
                            continue;
                        }
                    },
                };
                rules.push(CompiledRule {
                    category_index,
                    specificity: rule.pattern.specificity(),
                    order,
                    matcher,
                    min_amount_minor: rule.min_amount_minor,
                    max_amount_minor: rule.max_amount_minor,
                });
                order += 1;
            }
        }

        Self {
            categories: names,
            rules,
        }
    }

    /// Resolve the category for one transaction.
    ///
    /// Never fails on malformed merchant text; anything unmatched lands in
    /// [`UNCATEGORIZED`].
    pub fn categorize(&self, tx: &Transaction) -> String {
        // Exact per-transaction override wins unconditionally
        if let Some(user_category) = &tx.user_category {
            let trimmed = user_category.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }

        let description_upper = tx.description.to_uppercase();

        let mut best: Option<&CompiledRule> = None;
        for rule in &self.rules {
            if !self.amount_in_range(rule, tx.amount_minor) {
                continue;
            }
            let matched = match &rule.matcher {
                Matcher::Substring(needle) => description_upper.contains(needle.as_str()),
                Matcher::Regex(re) => re.is_match(&tx.description),
            };
            if !matched {
                continue;
            }
            let wins = match best {
                None => true,
                // Longest pattern wins; ties go to the earliest-defined rule
                Some(current) => {
                    rule.specificity > current.specificity
                        || (rule.specificity == current.specificity && rule.order < current.order)
                }
            };
            if wins {
                best = Some(rule);
            }
        }

        match best {
            Some(rule) => self.categories[rule.category_index].clone(),
            None => UNCATEGORIZED.to_string(),
        }
    }

    /// Resolve categories for a batch, keyed by transaction id
    pub fn categorize_all(&self, transactions: &[Transaction]) -> HashMap<String, String> {
        transactions
            .iter()
            .map(|tx| (tx.id.clone(), self.categorize(tx)))
            .collect()
    }

    fn amount_in_range(&self, rule: &CompiledRule, amount_minor: i64) -> bool {
        if let Some(min) = rule.min_amount_minor {
            if amount_minor < min {
                return false;
            }
        }
        if let Some(max) = rule.max_amount_minor {
            if amount_minor > max {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryRule, TransactionStatus};
    use chrono::NaiveDate;

    fn tx(description: &str, amount_minor: i64, user_category: Option<&str>) -> Transaction {
        Transaction {
            id: "t1".into(),
            account_id: "acct".into(),
            posted: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            amount_minor,
            description: description.into(),
            user_category: user_category.map(String::from),
            status: TransactionStatus::Settled,
        }
    }

    fn category(name: &str, rules: Vec<CategoryRule>) -> Category {
        Category {
            name: name.into(),
            rules,
        }
    }

    fn substring_rule(pattern: &str) -> CategoryRule {
        CategoryRule {
            pattern: MatchPattern::Substring(pattern.into()),
            min_amount_minor: None,
            max_amount_minor: None,
        }
    }

    #[test]
    fn test_override_wins_over_rules() {
        let categorizer = Categorizer::new(&[category(
            "Entertainment",
            vec![substring_rule("NETFLIX")],
        )]);
        let assigned = categorizer.categorize(&tx("NETFLIX.COM", -1549, Some("Gifts")));
        assert_eq!(assigned, "Gifts");
    }

    #[test]
    fn test_longest_substring_wins() {
        let categorizer = Categorizer::new(&[
            category("Shopping", vec![substring_rule("AMAZON")]),
            category("Media", vec![substring_rule("AMAZON PRIME")]),
        ]);
        let assigned = categorizer.categorize(&tx("AMAZON PRIME*AB12C", -899, None));
        assert_eq!(assigned, "Media");
    }

    #[test]
    fn test_tie_goes_to_earliest_rule() {
        let categorizer = Categorizer::new(&[
            category("First", vec![substring_rule("COFFEE")]),
            category("Second", vec![substring_rule("COFFEE")]),
        ]);
        let assigned = categorizer.categorize(&tx("BLUE COFFEE CO", -450, None));
        assert_eq!(assigned, "First");
    }

    #[test]
    fn test_regex_rule() {
        let categorizer = Categorizer::new(&[category(
            "Rideshare",
            vec![CategoryRule {
                pattern: MatchPattern::Regex(r"(?i)^(uber|lyft)\b".into()),
                min_amount_minor: None,
                max_amount_minor: None,
            }],
        )]);
        assert_eq!(
            categorizer.categorize(&tx("UBER TRIP 12345", -2300, None)),
            "Rideshare"
        );
        assert_eq!(
            categorizer.categorize(&tx("UBERLIN CAFE", -2300, None)),
            UNCATEGORIZED
        );
    }

    #[test]
    fn test_amount_range_gates_rule() {
        let categorizer = Categorizer::new(&[category(
            "Rent",
            vec![CategoryRule {
                pattern: MatchPattern::Substring("TRANSFER".into()),
                min_amount_minor: Some(-200_000),
                max_amount_minor: Some(-100_000),
            }],
        )]);
        assert_eq!(
            categorizer.categorize(&tx("ACH TRANSFER", -150_000, None)),
            "Rent"
        );
        // Outside the amount range the rule does not apply
        assert_eq!(
            categorizer.categorize(&tx("ACH TRANSFER", -5_000, None)),
            UNCATEGORIZED
        );
    }

    #[test]
    fn test_invalid_regex_dropped_not_fatal() {
        let categorizer = Categorizer::new(&[category(
            "Broken",
            vec![
                CategoryRule {
                    pattern: MatchPattern::Regex("(unclosed".into()),
                    min_amount_minor: None,
                    max_amount_minor: None,
                },
                substring_rule("SPOTIFY"),
            ],
        )]);
        assert_eq!(
            categorizer.categorize(&tx("SPOTIFY USA", -1099, None)),
            "Broken"
        );
    }

    #[test]
    fn test_garbage_description_falls_back() {
        let categorizer = Categorizer::new(&[category(
            "Entertainment",
            vec![substring_rule("NETFLIX")],
        )]);
        assert_eq!(
            categorizer.categorize(&tx("\u{fffd}\u{0000}??###", -100, None)),
            UNCATEGORIZED
        );
        assert_eq!(categorizer.categorize(&tx("", -100, None)), UNCATEGORIZED);
    }
}

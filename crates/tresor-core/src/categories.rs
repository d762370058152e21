//! Category vocabulary
//!
//! The closed set of category labels the models are asked to choose from.
//! Names are matched by exact string equality downstream, so they double as a
//! wire format: changing a name here breaks stored transactions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Built-in expense categories (name, emoji). The last entry is the catch-all.
const EXPENSE_CATEGORIES: &[(&str, &str)] = &[
    ("Alimentation", "🛒"),
    ("Restaurant", "🍽️"),
    ("Transport", "🚗"),
    ("Logement", "🏠"),
    ("Factures", "💡"),
    ("Santé", "💊"),
    ("Éducation", "🎓"),
    ("Loisirs", "🎉"),
    ("Shopping", "🛍️"),
    ("Communication", "📱"),
    ("Famille", "👨‍👩‍👧"),
    ("Voyage", "✈️"),
    ("Abonnements", "📺"),
    ("Impôts", "🏛️"),
    ("Dons", "🤝"),
    ("Autres dépenses", "📦"),
];

/// Built-in income categories (name, emoji). The last entry is the catch-all.
const INCOME_CATEGORIES: &[(&str, &str)] = &[
    ("Salaire", "💼"),
    ("Freelance", "💻"),
    ("Ventes", "🏷️"),
    ("Investissements", "📈"),
    ("Cadeaux", "🎁"),
    ("Remboursements", "🔄"),
    ("Allocations", "🏦"),
    ("Autres revenus", "💰"),
];

/// Which side of the ledger a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Expense,
    Income,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" | "depense" | "dépense" => Ok(Self::Expense),
            "income" | "revenu" => Ok(Self::Income),
            _ => Err(format!("Unknown category kind: {} (expected expense or income)", s)),
        }
    }
}

/// A single category label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub emoji: String,
}

impl Category {
    pub fn new(name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emoji: emoji.into(),
        }
    }
}

/// Expense and income category sets
///
/// The two sets are disjoint and non-empty. The last entry of each set is the
/// catch-all used when a suggestion falls outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryVocabulary {
    expense: Vec<Category>,
    income: Vec<Category>,
}

impl CategoryVocabulary {
    /// Build a custom vocabulary (e.g. for another locale)
    pub fn new(expense: Vec<Category>, income: Vec<Category>) -> Result<Self> {
        if expense.is_empty() || income.is_empty() {
            return Err(Error::InvalidData(
                "Category vocabulary needs at least one expense and one income category".into(),
            ));
        }

        if let Some(shared) = expense
            .iter()
            .find(|e| income.iter().any(|i| i.name == e.name))
        {
            return Err(Error::InvalidData(format!(
                "Category '{}' is both an expense and an income category",
                shared.name
            )));
        }

        Ok(Self { expense, income })
    }

    /// Categories of one kind, in display order
    pub fn categories(&self, kind: CategoryKind) -> &[Category] {
        match kind {
            CategoryKind::Expense => &self.expense,
            CategoryKind::Income => &self.income,
        }
    }

    pub fn expense(&self) -> &[Category] {
        &self.expense
    }

    pub fn income(&self) -> &[Category] {
        &self.income
    }

    /// Exact-match lookup
    pub fn contains(&self, kind: CategoryKind, name: &str) -> bool {
        self.categories(kind).iter().any(|c| c.name == name)
    }

    /// Case- and whitespace-insensitive lookup, returning the canonical entry
    pub fn find_case_insensitive(&self, kind: CategoryKind, name: &str) -> Option<&Category> {
        let wanted = name.trim().to_lowercase();
        self.categories(kind)
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
    }

    /// The catch-all category for a kind
    pub fn catch_all(&self, kind: CategoryKind) -> &Category {
        // Non-empty by construction
        &self.categories(kind)[self.categories(kind).len() - 1]
    }

    /// Names rendered for interpolation into a prompt: `"A", "B", "C"`
    pub fn prompt_list(&self, kind: CategoryKind) -> String {
        self.categories(kind)
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for CategoryVocabulary {
    fn default() -> Self {
        let build = |entries: &[(&str, &str)]| {
            entries
                .iter()
                .map(|(name, emoji)| Category::new(*name, *emoji))
                .collect()
        };
        Self {
            expense: build(EXPENSE_CATEGORIES),
            income: build(INCOME_CATEGORIES),
        }
    }
}

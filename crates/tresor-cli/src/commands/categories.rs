//! Category vocabulary command

use anyhow::Result;
use tresor_core::{CategoryKind, CategoryVocabulary};

pub fn cmd_categories() -> Result<()> {
    let vocabulary = CategoryVocabulary::default();

    for (title, kind) in [("Expenses", CategoryKind::Expense), ("Incomes", CategoryKind::Income)] {
        println!("{}:", title);
        for category in vocabulary.categories(kind) {
            println!("  {} {}", category.emoji, category.name);
        }
        println!();
    }

    Ok(())
}

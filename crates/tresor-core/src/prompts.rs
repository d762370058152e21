//! Prompt Library
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tresor/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to customize prompts without modifying the source,
//! while automatically getting new default prompts on upgrade.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const EXTRACT_TRANSACTIONS: &str =
        include_str!("../../../prompts/extract_transactions.md");
    pub const TRANSCRIBE_IMAGE: &str = include_str!("../../../prompts/transcribe_image.md");
    pub const SCAN_RECEIPT: &str = include_str!("../../../prompts/scan_receipt.md");
    pub const SUGGEST_CATEGORY: &str = include_str!("../../../prompts/suggest_category.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Agent W instruction set
    ExtractTransactions,
    /// Verbatim OCR instruction
    TranscribeImage,
    ScanReceipt,
    SuggestCategory,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => "extract_transactions",
            Self::TranscribeImage => "transcribe_image",
            Self::ScanReceipt => "scan_receipt",
            Self::SuggestCategory => "suggest_category",
        }
    }

    /// Get all known prompt IDs
    pub fn all() -> &'static [PromptId] {
        &[
            Self::ExtractTransactions,
            Self::TranscribeImage,
            Self::ScanReceipt,
            Self::SuggestCategory,
        ]
    }

    /// Get the default embedded content for this prompt
    pub fn default_content(&self) -> &'static str {
        match self {
            Self::ExtractTransactions => defaults::EXTRACT_TRANSACTIONS,
            Self::TranscribeImage => defaults::TRANSCRIBE_IMAGE,
            Self::ScanReceipt => defaults::SCAN_RECEIPT,
            Self::SuggestCategory => defaults::SUGGEST_CATEGORY,
        }
    }
}

impl std::str::FromStr for PromptId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| Error::Prompt(format!("Unknown prompt: {}", s)))
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    /// Unique identifier
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    /// Task type for model routing (extraction, ocr, receipt, completion)
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Metadata from frontmatter
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    /// Whether this came from an override file
    pub is_override: bool,
    /// Path to override file (if any)
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Get the system section of the prompt
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    /// Get the user section of the prompt
    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the whole prompt with template variables replaced
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.content, vars)
    }

    /// Render just the user section with variables
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        match self.user_section() {
            Some(user) => render_template(user, vars),
            None => self.render(vars),
        }
    }

    /// System and user sections rendered into one message
    ///
    /// Providers receive a single user turn, so the system section is put in
    /// front of the user section.
    pub fn render_message(&self, vars: &HashMap<&str, &str>) -> String {
        match (self.system_section(), self.user_section()) {
            (Some(system), Some(user)) => format!(
                "{}\n\n{}",
                render_template(system, vars),
                render_template(user, vars)
            ),
            _ => self.render(vars),
        }
    }
}

/// Prompt library for loading and caching prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    /// Override directory path
    override_dir: Option<PathBuf>,
    /// Cached parsed prompts
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::Prompt(format!("Prompt {} missing from cache", id.as_str())))
    }

    /// Load a prompt (checking override first, then default), bypassing the cache
    pub fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(override_path) = self.override_path(id) {
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::Prompt(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                check_id(id, &metadata)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(override_path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// List all prompts with their override status
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let has_override = self.has_override(id);
                let override_path = if has_override {
                    self.override_path(id)
                } else {
                    None
                };
                let prompt = self.get(id).ok();
                PromptInfo {
                    id: id.as_str().to_string(),
                    version: prompt.map(|p| p.metadata.version).unwrap_or(0),
                    task_type: prompt
                        .map(|p| p.metadata.task_type.clone())
                        .unwrap_or_default(),
                    has_override,
                    override_path,
                }
            })
            .collect()
    }

    /// Check if a prompt has an override file
    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    /// Where the override for `id` lives (whether or not it exists)
    pub fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }

    /// Get the override directory path
    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a prompt for listing
#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    /// Prompt identifier
    pub id: String,
    /// Version from metadata
    pub version: u32,
    /// Task type for model routing
    pub task_type: String,
    /// Whether an override exists
    pub has_override: bool,
    /// Path to override file (if exists)
    pub override_path: Option<PathBuf>,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tresor").join("prompts").join("overrides"))
}

fn check_id(id: PromptId, metadata: &PromptMetadata) -> Result<()> {
    if metadata.id != id.as_str() {
        return Err(Error::Prompt(format!(
            "Override for {} declares id '{}'",
            id.as_str(),
            metadata.id
        )));
    }
    Ok(())
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| Error::Prompt("Prompt must start with YAML frontmatter (---)".into()))?;

    let end = rest.find("---").ok_or_else(|| {
        Error::Prompt("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Prompt(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];

    // Find the next header or end of content
    let end = after_header.find("\n# ").unwrap_or(after_header.len());

    Some(after_header[..end].trim())
}

/// Resolve `{{#if var}}...{{/if}}` blocks, then substitute `{{var}}`
///
/// Substitution is a single pass, so values containing `{{...}}` (user text)
/// are never expanded. Unknown variables are left as written.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let template = resolve_conditionals(template, vars);
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Keep conditional blocks whose variable is present and non-empty
fn resolve_conditionals(content: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_end].trim().to_string();
        let block_start = var_start + var_end + 2;

        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_content = result[block_start..block_start + endif_pos].to_string();
        let full_end = block_start + endif_pos + 7;

        let should_include = vars.get(var_name.as_str()).is_some_and(|v| !v.is_empty());
        let replacement = if should_include { block_content } else { String::new() };
        result = format!("{}{}{}", &result[..if_start], replacement, &result[full_end..]);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let content = r#"---
id: test_prompt
version: 1
task_type: extraction
---

# System
Test system prompt.

# User
Test user prompt with {{variable}}.
"#;

        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.task_type, "extraction");
        assert!(body.contains("# System"));
        assert!(body.contains("# User"));
    }

    #[test]
    fn test_parse_prompt_without_frontmatter() {
        assert!(matches!(parse_prompt("# User\nHello"), Err(Error::Prompt(_))));
        assert!(parse_prompt("---\nid: x\n").is_err());
    }

    #[test]
    fn test_extract_section() {
        let content = "# System\nSystem content here.\n\n# User\nUser content here.";

        assert_eq!(extract_section(content, "# System"), Some("System content here."));
        assert_eq!(extract_section(content, "# User"), Some("User content here."));
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("name", "World");
        vars.insert("value", "42");

        let rendered = render_template("Hello {{name}}, your value is {{ value }}.", &vars);
        assert_eq!(rendered, "Hello World, your value is 42.");
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let mut vars = HashMap::new();
        vars.insert("text", "j'ai payé {{currency}}");
        vars.insert("currency", "XOF");

        let rendered = render_template("{{currency}}: {{text}}", &vars);
        assert_eq!(rendered, "XOF: j'ai payé {{currency}}");
    }

    #[test]
    fn test_render_keeps_unknown_variables() {
        let vars = HashMap::new();
        assert_eq!(render_template("a {{missing}} b {{", &vars), "a {{missing}} b {{");
    }

    #[test]
    fn test_conditional_blocks() {
        let content = "Start{{#if amount}}\nAmount: {{amount}}{{/if}}\nEnd";

        let mut vars = HashMap::new();
        vars.insert("amount", "500");
        assert_eq!(render_template(content, &vars), "Start\nAmount: 500\nEnd");

        let empty_vars: HashMap<&str, &str> = HashMap::new();
        assert_eq!(render_template(content, &empty_vars), "Start\nEnd");

        let mut blank = HashMap::new();
        blank.insert("amount", "");
        assert_eq!(render_template(content, &blank), "Start\nEnd");
    }

    #[test]
    fn test_render_message_joins_sections() {
        let (metadata, content) =
            parse_prompt("---\nid: t\nversion: 1\ntask_type: ocr\n---\n# System\nYou are {{who}}.\n\n# User\nDo {{what}}.")
                .unwrap();
        let prompt = Prompt {
            metadata,
            content,
            is_override: false,
            override_path: None,
        };
        let mut vars = HashMap::new();
        vars.insert("who", "W");
        vars.insert("what", "it");
        assert_eq!(prompt.render_message(&vars), "You are W.\n\nDo it.");
        assert_eq!(prompt.render_user(&vars), "Do it.");
    }

    #[test]
    fn test_prompt_library_embedded() {
        let mut lib = PromptLibrary::embedded_only();

        for id in PromptId::all() {
            let prompt = lib.get(*id).unwrap();
            assert!(!prompt.is_override);
            assert!(prompt.override_path.is_none());
            assert!(prompt.user_section().is_some());
        }
        assert_eq!(lib.list().len(), PromptId::all().len());
    }

    #[test]
    fn test_default_prompts_parse() {
        for id in PromptId::all() {
            let result = parse_prompt(id.default_content());
            assert!(
                result.is_ok(),
                "Failed to parse {}: {:?}",
                id.as_str(),
                result.err()
            );

            let (metadata, _) = result.unwrap();
            assert_eq!(metadata.id, id.as_str(), "Prompt ID mismatch for {}", id.as_str());
        }
    }

    #[test]
    fn test_extraction_prompt_carries_rules() {
        let prompt = PromptLibrary::embedded_only()
            .load(PromptId::ExtractTransactions)
            .unwrap();
        let content = &prompt.content;
        assert!(content.contains("every discrete financial action"));
        assert!(content.contains("YYYY-MM-DD"));
        assert!(content.contains("never contain a placeholder or empty object"));
        for var in ["{{text}}", "{{current_date}}", "{{currency}}", "{{expense_categories}}", "{{income_categories}}"] {
            assert!(content.contains(var), "missing {}", var);
        }
    }

    #[test]
    fn test_override_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("suggest_category.md"),
            "---\nid: suggest_category\nversion: 7\ntask_type: completion\n---\n# User\nCustom {{description}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.has_override(PromptId::SuggestCategory));
        assert!(!lib.has_override(PromptId::ScanReceipt));

        let prompt = lib.get(PromptId::SuggestCategory).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 7);

        let listed = lib.list();
        let info = listed.iter().find(|p| p.id == "suggest_category").unwrap();
        assert!(info.has_override);
        assert!(info.override_path.is_some());
    }

    #[test]
    fn test_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        let lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert_eq!(lib.override_dir(), Some(&dir.path().to_path_buf()));
        assert_eq!(
            lib.override_path(PromptId::ScanReceipt),
            Some(dir.path().join("scan_receipt.md"))
        );
        assert!(PromptLibrary::embedded_only().override_dir().is_none());
    }

    #[test]
    fn test_override_with_wrong_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scan_receipt.md"),
            "---\nid: something_else\nversion: 1\ntask_type: receipt\n---\n# User\nx",
        )
        .unwrap();

        let lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.load(PromptId::ScanReceipt).is_err());
    }

    #[test]
    fn test_prompt_id_from_str() {
        assert_eq!("scan_receipt".parse::<PromptId>().unwrap(), PromptId::ScanReceipt);
        assert!("classify_merchant".parse::<PromptId>().is_err());
    }
}

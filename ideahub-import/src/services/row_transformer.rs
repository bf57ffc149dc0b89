//! Row transformer
//!
//! Maps one raw spreadsheet row onto a validated [`CreateIdea`] command.
//! Header matching happens once per sheet; every row is then transformed
//! independently with no I/O, so a bad cell only ever fails its own row.

use crate::models::CreateIdea;
use crate::services::spreadsheet::RawRow;
use std::collections::HashMap;
use thiserror::Error;

/// Maximum slug length in characters
pub const MAX_SLUG_LEN: usize = 80;

/// Row-level validation failure; `Display` is what ends up in the job's error log
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Target fields of the idea record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Description,
    Slug,
    Category,
    Tags,
    TargetMarket,
    RevenueModel,
    MarketSize,
    Difficulty,
    Featured,
    Metadata,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::Slug => "slug",
            Field::Category => "category",
            Field::Tags => "tags",
            Field::TargetMarket => "target_market",
            Field::RevenueModel => "revenue_model",
            Field::MarketSize => "market_size",
            Field::Difficulty => "difficulty",
            Field::Featured => "featured",
            Field::Metadata => "metadata",
        }
    }

    /// Accepted header spellings after [`normalize_header`]
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::Title => &["title", "name", "idea", "idea name", "idea title", "startup name"],
            Field::Description => &["description", "summary", "pitch", "overview", "details"],
            Field::Slug => &["slug", "handle"],
            Field::Category => &["category", "industry", "sector", "vertical"],
            Field::Tags => &["tags", "keywords", "labels"],
            Field::TargetMarket => &["target market", "market", "audience", "target audience", "customers"],
            Field::RevenueModel => &["revenue model", "business model", "monetization", "monetisation"],
            Field::MarketSize => &["market size", "tam", "market size usd"],
            Field::Difficulty => &["difficulty", "complexity", "effort"],
            Field::Featured => &["featured", "is featured", "highlight"],
            Field::Metadata => &["metadata", "extra", "attributes", "json"],
        }
    }

    const ALL: [Field; 11] = [
        Field::Title,
        Field::Description,
        Field::Slug,
        Field::Category,
        Field::Tags,
        Field::TargetMarket,
        Field::RevenueModel,
        Field::MarketSize,
        Field::Difficulty,
        Field::Featured,
        Field::Metadata,
    ];
}

/// Lowercase, treat `_`/`-` as spaces, collapse whitespace
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a URL-safe uniqueness key
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Column layout resolved from one sheet's header row
#[derive(Debug, Clone)]
pub struct RowTransformer {
    columns: HashMap<Field, usize>,
    unmapped: Vec<String>,
}

impl RowTransformer {
    /// Match headers to fields; the first column matching a field wins
    pub fn new(headers: &[String]) -> Self {
        let mut columns = HashMap::new();
        let mut unmapped = Vec::new();

        for (index, header) in headers.iter().enumerate() {
            let normalized = normalize_header(header);
            let field = Field::ALL
                .iter()
                .copied()
                .find(|f| f.synonyms().contains(&normalized.as_str()));

            match field {
                Some(field) => {
                    columns.entry(field).or_insert(index);
                }
                None if !normalized.is_empty() => unmapped.push(header.clone()),
                None => {}
            }
        }

        Self { columns, unmapped }
    }

    /// Headers that matched no field (ignored during transform)
    pub fn unmapped_headers(&self) -> &[String] {
        &self.unmapped
    }

    pub fn is_mapped(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Trimmed cell for `field`, `None` if the column is absent or blank
    fn cell<'a>(&self, row: &'a RawRow, field: Field) -> Option<&'a str> {
        self.columns
            .get(&field)
            .and_then(|&i| row.values.get(i))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, row: &RawRow, field: Field) -> Result<String, RowError> {
        self.cell(row, field)
            .map(str::to_string)
            .ok_or(RowError::MissingField(field.name()))
    }

    fn optional(&self, row: &RawRow, field: Field) -> Option<String> {
        self.cell(row, field).map(str::to_string)
    }

    /// Transform one row into a create command
    pub fn transform(&self, row: &RawRow) -> Result<CreateIdea, RowError> {
        let title = self.required(row, Field::Title)?;
        let description = self.required(row, Field::Description)?;

        let slug_source = self.cell(row, Field::Slug).unwrap_or(title.as_str());
        let slug = slugify(slug_source);
        if slug.is_empty() {
            return Err(RowError::InvalidValue {
                field: Field::Slug.name(),
                reason: format!("'{}' contains no letters or digits", slug_source),
            });
        }

        let tags = match self.cell(row, Field::Tags) {
            Some(raw) => parse_tags(raw)?,
            None => Vec::new(),
        };

        let market_size = self
            .cell(row, Field::MarketSize)
            .map(parse_market_size)
            .transpose()?;

        let difficulty = self
            .cell(row, Field::Difficulty)
            .map(parse_difficulty)
            .transpose()?;

        let featured = self
            .cell(row, Field::Featured)
            .map(|raw| parse_bool(Field::Featured, raw))
            .transpose()?
            .unwrap_or(false);

        let metadata = self
            .cell(row, Field::Metadata)
            .map(parse_metadata)
            .transpose()?;

        Ok(CreateIdea {
            title,
            description,
            slug,
            category: self.optional(row, Field::Category),
            tags,
            target_market: self.optional(row, Field::TargetMarket),
            revenue_model: self.optional(row, Field::RevenueModel),
            market_size,
            difficulty,
            featured,
            metadata,
        })
    }
}

fn invalid(field: Field, reason: impl Into<String>) -> RowError {
    RowError::InvalidValue {
        field: field.name(),
        reason: reason.into(),
    }
}

/// Comma/semicolon separated list, or a JSON array of strings
fn parse_tags(raw: &str) -> Result<Vec<String>, RowError> {
    let tags: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw)
            .map_err(|e| invalid(Field::Tags, format!("not a JSON string array ({})", e)))?
    } else {
        raw.split([',', ';']).map(str::to_string).collect()
    };

    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

/// Accepts thousands separators and a leading `$`
fn parse_market_size(raw: &str) -> Result<f64, RowError> {
    let cleaned: String = raw
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    let value: f64 = cleaned
        .parse()
        .map_err(|_| invalid(Field::MarketSize, format!("'{}' is not a number", raw)))?;

    if !value.is_finite() || value < 0.0 {
        return Err(invalid(
            Field::MarketSize,
            format!("'{}' must be a non-negative number", raw),
        ));
    }
    Ok(value)
}

fn parse_difficulty(raw: &str) -> Result<u8, RowError> {
    // Spreadsheets often hand back "3.0" for an integer cell
    let value: f64 = raw
        .parse()
        .map_err(|_| invalid(Field::Difficulty, format!("'{}' is not a number", raw)))?;

    if value.fract() != 0.0 || !(1.0..=5.0).contains(&value) {
        return Err(invalid(
            Field::Difficulty,
            format!("'{}' must be a whole number from 1 to 5", raw),
        ));
    }
    Ok(value as u8)
}

fn parse_bool(field: Field, raw: &str) -> Result<bool, RowError> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "x" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(invalid(field, format!("'{}' is not a boolean", raw))),
    }
}

fn parse_metadata(raw: &str) -> Result<serde_json::Value, RowError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| invalid(Field::Metadata, format!("malformed JSON ({})", e)))?;

    if !value.is_object() {
        return Err(invalid(Field::Metadata, "expected a JSON object"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(number: usize, values: &[&str]) -> RawRow {
        RawRow {
            number,
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Target_Market "), "target market");
        assert_eq!(normalize_header("REVENUE-model"), "revenue model");
        assert_eq!(normalize_header("Idea   Name"), "idea name");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Uber for Dogs!"), "uber-for-dogs");
        assert_eq!(slugify("  --AI  Tutor-- "), "ai-tutor");
        assert_eq!(slugify("Café Finder"), "caf-finder");
        assert_eq!(slugify("!!!"), "");

        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_synonyms_map_case_insensitively() {
        let t = RowTransformer::new(&headers(&["Name", "PITCH", "Industry", "Owner"]));
        let cmd = t.transform(&row(1, &["Dog Walker", "Walk dogs", "Pets", "bob"])).unwrap();

        assert_eq!(cmd.title, "Dog Walker");
        assert_eq!(cmd.description, "Walk dogs");
        assert_eq!(cmd.category.as_deref(), Some("Pets"));
        assert_eq!(cmd.slug, "dog-walker");
        assert_eq!(t.unmapped_headers(), &["Owner".to_string()]);
    }

    #[test]
    fn test_missing_title_column() {
        let t = RowTransformer::new(&headers(&["description"]));
        let err = t.transform(&row(1, &["something"])).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: title");
    }

    #[test]
    fn test_blank_title_cell_is_missing() {
        let t = RowTransformer::new(&headers(&["title", "description"]));
        let err = t.transform(&row(4, &["   ", "something"])).unwrap_err();
        assert_eq!(err, RowError::MissingField("title"));
    }

    #[test]
    fn test_short_row_is_missing_description() {
        let t = RowTransformer::new(&headers(&["title", "description"]));
        let err = t.transform(&row(2, &["Only title"])).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: description");
    }

    #[test]
    fn test_type_coercion() {
        let t = RowTransformer::new(&headers(&[
            "title", "description", "tags", "market_size", "difficulty", "featured", "metadata",
        ]));
        let cmd = t
            .transform(&row(
                1,
                &["X", "Y", "AI; SaaS, ai", "$1,500,000", "3.0", "Yes", r#"{"source":"sheet"}"#],
            ))
            .unwrap();

        assert_eq!(cmd.tags, vec!["ai", "saas"]);
        assert_eq!(cmd.market_size, Some(1_500_000.0));
        assert_eq!(cmd.difficulty, Some(3));
        assert!(cmd.featured);
        assert_eq!(cmd.metadata.unwrap()["source"], "sheet");
    }

    #[test]
    fn test_json_tags() {
        let t = RowTransformer::new(&headers(&["title", "description", "keywords"]));
        let cmd = t.transform(&row(1, &["X", "Y", r#"["Fintech", "B2B"]"#])).unwrap();
        assert_eq!(cmd.tags, vec!["fintech", "b2b"]);
    }

    #[test]
    fn test_coercion_failures_are_row_errors() {
        let t = RowTransformer::new(&headers(&[
            "title", "description", "market size", "difficulty", "featured", "metadata",
        ]));

        let err = t.transform(&row(1, &["X", "Y", "lots", "", "", ""])).unwrap_err();
        assert_eq!(err.to_string(), "invalid market_size: 'lots' is not a number");

        let err = t.transform(&row(1, &["X", "Y", "-5", "", "", ""])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "market_size", .. }));

        let err = t.transform(&row(1, &["X", "Y", "", "7", "", ""])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "difficulty", .. }));

        let err = t.transform(&row(1, &["X", "Y", "", "2.5", "", ""])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "difficulty", .. }));

        let err = t.transform(&row(1, &["X", "Y", "", "", "maybe", ""])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "featured", .. }));

        let err = t.transform(&row(1, &["X", "Y", "", "", "", "[1,2]"])).unwrap_err();
        assert_eq!(err.to_string(), "invalid metadata: expected a JSON object");

        let err = t.transform(&row(1, &["X", "Y", "", "", "", "{oops"])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "metadata", .. }));
    }

    #[test]
    fn test_explicit_slug_column_is_normalized() {
        let t = RowTransformer::new(&headers(&["title", "description", "slug"]));
        let cmd = t.transform(&row(1, &["Title", "Desc", "My Custom Slug"])).unwrap();
        assert_eq!(cmd.slug, "my-custom-slug");
    }

    #[test]
    fn test_symbol_only_title_fails_slug() {
        let t = RowTransformer::new(&headers(&["title", "description"]));
        let err = t.transform(&row(1, &["???", "Desc"])).unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { field: "slug", .. }));
    }

    #[test]
    fn test_first_matching_column_wins() {
        let t = RowTransformer::new(&headers(&["title", "name", "description"]));
        let cmd = t.transform(&row(1, &["First", "Second", "Desc"])).unwrap();
        assert_eq!(cmd.title, "First");
        assert!(t.is_mapped(Field::Title));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let t = RowTransformer::new(&headers(&["title", "description"]));
        let r = row(1, &["Same Idea", "Same text"]);
        assert_eq!(t.transform(&r).unwrap(), t.transform(&r).unwrap());
    }
}

//! Legacy document migration
//!
//! Older site documents kept SEO fields, the theme color, the maintenance
//! switch and navigation links as flat top-level keys. [`MigrationAdapter`]
//! rewrites those shapes into the current nested layout before a document is
//! diffed. Every rule keys off a sentinel that the rewrite removes, so
//! migrating a current document is a no-op.
//!
//! When both shapes are present the current value wins and the legacy key is
//! dropped.

use serde_json::{json, Map, Value};

/// One legacy-shape rewrite
pub trait MigrationRule: Send + Sync + std::fmt::Debug {
    /// Stable rule name, reported in [`MigrationReport::applied`]
    fn name(&self) -> &'static str;

    /// Whether `document` still carries this rule's legacy shape
    fn detect(&self, document: &Map<String, Value>) -> bool;

    /// Rewrite `document` in place; only called when [`Self::detect`] is true
    fn migrate(&self, document: &mut Map<String, Value>);
}

/// Result of migrating one document
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// Migrated document
    pub document: Value,
    /// Names of rules that fired, in order
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    /// Whether any rule changed the document
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ordered set of [`MigrationRule`]s
#[derive(Debug)]
pub struct MigrationAdapter {
    rules: Vec<Box<dyn MigrationRule>>,
}

impl MigrationAdapter {
    /// Adapter with the built-in site document rules
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with_rule(LegacySeoFields)
            .with_rule(LegacyThemeColor)
            .with_rule(LegacyMaintenanceFlag)
            .with_rule(LegacyNavLinks)
    }

    /// Adapter with no rules
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule
    #[inline]
    #[must_use]
    pub fn with_rule(mut self, rule: impl MigrationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Rule names in application order
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Whether any rule would fire on `document`
    #[must_use]
    pub fn is_legacy(&self, document: &Value) -> bool {
        document
            .as_object()
            .is_some_and(|map| self.rules.iter().any(|r| r.detect(map)))
    }

    /// Migrate `document`, returning the current-shape copy
    #[must_use]
    pub fn migrate(&self, document: &Value) -> Value {
        self.migrate_report(document).document
    }

    /// Migrate `document` and report which rules fired
    #[must_use]
    pub fn migrate_report(&self, document: &Value) -> MigrationReport {
        let mut document = document.clone();
        let mut applied = Vec::new();

        if let Value::Object(map) = &mut document {
            for rule in &self.rules {
                if rule.detect(map) {
                    let before = map.clone();
                    rule.migrate(map);
                    if *map != before {
                        applied.push(rule.name());
                    }
                }
            }
        }

        MigrationReport { document, applied }
    }
}

impl Default for MigrationAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Object stored at `key`, created when absent
///
/// `None` when `key` holds a non-object value that must not be clobbered.
fn section<'a>(document: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    document
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

/// Nested object at `keys`, each step created when absent
fn section_at<'a>(
    document: &'a mut Map<String, Value>,
    keys: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    keys.iter().try_fold(document, |map, key| section(map, key))
}

/// Move `document[from]` to `sections.../to` unless `to` is already set
///
/// The legacy key stays in place when a section on the way is not an
/// object.
fn relocate(document: &mut Map<String, Value>, from: &str, sections: &[&str], to: &str) {
    let Some(value) = document.remove(from) else {
        return;
    };
    match section_at(document, sections) {
        Some(target) => {
            target.entry(to).or_insert(value);
        }
        None => {
            document.insert(from.to_string(), value);
        }
    }
}

/// `seo_title` / `seo_description` / `seo_keywords` → `seo.*`
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySeoFields;

impl LegacySeoFields {
    const FIELDS: [(&'static str, &'static str); 3] = [
        ("seo_title", "title"),
        ("seo_description", "description"),
        ("seo_keywords", "keywords"),
    ];
}

impl MigrationRule for LegacySeoFields {
    fn name(&self) -> &'static str {
        "legacy-seo-fields"
    }

    fn detect(&self, document: &Map<String, Value>) -> bool {
        Self::FIELDS.iter().any(|(legacy, _)| document.contains_key(*legacy))
    }

    fn migrate(&self, document: &mut Map<String, Value>) {
        for (legacy, current) in Self::FIELDS {
            relocate(document, legacy, &["seo"], current);
        }
    }
}

/// `theme_color` → `theme.colors.primary`
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyThemeColor;

impl MigrationRule for LegacyThemeColor {
    fn name(&self) -> &'static str {
        "legacy-theme-color"
    }

    fn detect(&self, document: &Map<String, Value>) -> bool {
        document.contains_key("theme_color")
    }

    fn migrate(&self, document: &mut Map<String, Value>) {
        relocate(document, "theme_color", &["theme", "colors"], "primary");
    }
}

/// Boolean `maintenance` → `{ "enabled": bool, "message": null }`
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyMaintenanceFlag;

impl MigrationRule for LegacyMaintenanceFlag {
    fn name(&self) -> &'static str {
        "legacy-maintenance-flag"
    }

    fn detect(&self, document: &Map<String, Value>) -> bool {
        document.get("maintenance").is_some_and(Value::is_boolean)
    }

    fn migrate(&self, document: &mut Map<String, Value>) {
        if let Some(Value::Bool(enabled)) = document.get("maintenance").cloned() {
            document.insert(
                "maintenance".to_string(),
                json!({ "enabled": enabled, "message": null }),
            );
        }
    }
}

/// `nav_links` → `navigation.items`
///
/// Bare string links become `{ "label": s, "href": s }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyNavLinks;

impl MigrationRule for LegacyNavLinks {
    fn name(&self) -> &'static str {
        "legacy-nav-links"
    }

    fn detect(&self, document: &Map<String, Value>) -> bool {
        document.contains_key("nav_links")
    }

    fn migrate(&self, document: &mut Map<String, Value>) {
        let Some(links) = document.remove("nav_links") else {
            return;
        };
        match section(document, "navigation") {
            Some(navigation) => {
                navigation.entry("items").or_insert_with(|| Self::items(links));
            }
            None => {
                document.insert("nav_links".to_string(), links);
            }
        }
    }
}

impl LegacyNavLinks {
    fn items(links: Value) -> Value {
        match links {
            Value::Array(links) => Value::Array(
                links
                    .into_iter()
                    .map(|link| match link {
                        Value::String(href) => json!({ "label": href, "href": href }),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

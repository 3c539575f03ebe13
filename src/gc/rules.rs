//! Key classification for garbage collection.
//!
//! Keys are matched against a table of `(prefix, owner kind, id shape,
//! display variants)` rules. The longest matching prefix claims a key, so a
//! short generic prefix such as `cmd` never shadows `cmdCacheAttr`.

use super::owners::{EntityKind, OwnerId};

/// Ephemeral runtime counters, deleted on every pass.
pub const STATUS_SUFFIXES: [&str; 3] = ["::lastCommunication", "::state", "::numberTryWithoutSuccess"];

/// Display variants of rendered views.
pub const DISPLAY_VARIANTS: [&str; 3] = ["mobile", "dashboard", "dplan"];

/// How the owner id is written after the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    Numeric,
    Named,
}

/// One row of the ownership table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRule {
    pub prefix: String,
    pub owner: EntityKind,
    pub shape: IdShape,
    /// Variants allowed right before or right after a numeric id
    pub variants: Vec<String>,
}

impl OwnerRule {
    pub fn numeric(prefix: &str, owner: EntityKind) -> Self {
        Self {
            prefix: prefix.to_string(),
            owner,
            shape: IdShape::Numeric,
            variants: Vec::new(),
        }
    }

    pub fn named(prefix: &str, owner: EntityKind) -> Self {
        Self {
            shape: IdShape::Named,
            ..Self::numeric(prefix, owner)
        }
    }

    pub fn with_variants(mut self, variants: &[&str]) -> Self {
        self.variants = variants.iter().map(|v| v.to_string()).collect();
        self
    }

    fn parse_id(&self, rest: &str) -> Option<OwnerId> {
        match self.shape {
            IdShape::Named => {
                let name = rest.trim();
                (!name.is_empty()).then(|| OwnerId::Named(name.to_string()))
            }
            IdShape::Numeric => {
                let rest = self
                    .variants
                    .iter()
                    .find_map(|v| rest.strip_prefix(v.as_str()))
                    .filter(|r| r.starts_with(|c: char| c.is_ascii_digit()))
                    .unwrap_or(rest);
                let digits_end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                let (digits, tail) = rest.split_at(digits_end);
                if digits.is_empty() || !(tail.is_empty() || self.variants.iter().any(|v| v == tail)) {
                    return None;
                }
                digits.parse().ok().map(OwnerId::Numeric)
            }
        }
    }
}

/// What the collector should do with a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClass<'a> {
    /// Runtime counter, delete unconditionally
    Status,
    /// Owned by an entity that must be looked up
    Owned { rule: &'a OwnerRule, id: OwnerId },
    /// A prefix matched but the id could not be read; keep
    Ambiguous { rule: &'a OwnerRule },
    /// No rule applies; keep
    Unmatched,
}

/// Ownership table, ordered longest prefix first.
#[derive(Debug, Clone)]
pub struct OwnerRules {
    rules: Vec<OwnerRule>,
}

impl OwnerRules {
    pub fn new(mut rules: Vec<OwnerRule>) -> Self {
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules }
    }

    pub fn rules(&self) -> &[OwnerRule] {
        &self.rules
    }

    pub fn classify(&self, key: &str) -> KeyClass<'_> {
        if STATUS_SUFFIXES.iter().any(|s| key.ends_with(s)) {
            return KeyClass::Status;
        }
        let Some(rule) = self.rules.iter().find(|r| key.starts_with(r.prefix.as_str())) else {
            return KeyClass::Unmatched;
        };
        match rule.parse_id(&key[rule.prefix.len()..]) {
            Some(id) => KeyClass::Owned { rule, id },
            None => KeyClass::Ambiguous { rule },
        }
    }
}

impl Default for OwnerRules {
    fn default() -> Self {
        Self::new(vec![
            OwnerRule::numeric("cmdCacheAttr", EntityKind::Command),
            OwnerRule::numeric("cmd", EntityKind::Command),
            OwnerRule::numeric("eqLogicCacheAttr", EntityKind::Device),
            OwnerRule::numeric("eqLogicStatusAttr", EntityKind::Device),
            OwnerRule::numeric("scenarioCacheAttr", EntityKind::Scenario),
            OwnerRule::numeric("cronCacheAttr", EntityKind::Cron),
            OwnerRule::numeric("cron", EntityKind::Cron),
            OwnerRule::numeric("widgetHtml", EntityKind::Device).with_variants(&DISPLAY_VARIANTS),
            OwnerRule::numeric("camera", EntityKind::Device),
            OwnerRule::numeric("scenarioHtml", EntityKind::Scenario).with_variants(&DISPLAY_VARIANTS),
            OwnerRule::named("dependancy", EntityKind::Plugin),
        ])
    }
}

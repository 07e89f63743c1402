//! Rule item paths.
//!
//! A rule item of a given type is either *named* (many siblings under
//! `<root><type>/<name>`) or *unique* (a singleton at `<root><type>`). Each
//! item is a [`VersionNodePath`], so a key under a rule type has exactly one
//! of three shapes:
//!
//! ```text
//! <root><type>[/<name>]/versions/<n>
//! <root><type>[/<name>]/active_version
//! <root><type>[/<name>]
//! ```

use std::collections::BTreeMap;

use regex::Regex;

use crate::constants::RULE_ITEM_NAME_PATTERN;
use crate::path::check_segment;
use crate::path::compile;
use crate::path::join_path;
use crate::PathError;
use crate::Result;
use crate::VersionNodePath;

/// Which of the three key shapes a rule item key has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleItemPathShape {
    /// `.../versions/<n>`
    Version(u64),
    /// `.../active_version`
    ActiveVersion,
    /// The bare item path
    Item,
}

/// Result of classifying a key against the rule path table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleItemPathMatch {
    pub item_type: String,
    /// None for unique items
    pub name: Option<String>,
    pub shape: RuleItemPathShape,
}

#[derive(Debug, Clone)]
struct PatternTriple {
    versions: Regex,
    active_version: Regex,
    item: Regex,
}

impl PatternTriple {
    /// `prefix` is the regex of the item path without anchors
    fn new(prefix: &str) -> Result<Self> {
        Ok(Self {
            versions: compile(format!(r"^{}/versions/(\d+)$", prefix))?,
            active_version: compile(format!(r"^{}/active_version$", prefix))?,
            item: compile(format!(r"^{}$", prefix))?,
        })
    }
}

/// Paths of named rule items of one type
#[derive(Debug, Clone)]
pub struct NamedRuleItemNodePath {
    type_path: String,
    patterns: PatternTriple,
}

impl NamedRuleItemNodePath {
    /// `root` is the rule prefix and must end with '/'
    pub fn new(
        root: &str,
        item_type: &str,
    ) -> Result<Self> {
        check_segment(item_type)?;
        let type_path = format!("{}{}", root, item_type);
        let prefix = format!("{}/({})", regex::escape(&type_path), RULE_ITEM_NAME_PATTERN);
        Ok(Self {
            patterns: PatternTriple::new(&prefix)?,
            type_path,
        })
    }

    /// Parent of every item of this type
    pub fn type_path(&self) -> &str {
        &self.type_path
    }

    pub fn path(
        &self,
        name: &str,
    ) -> VersionNodePath {
        VersionNodePath::new(join_path(&self.type_path, name))
    }

    /// Item name and revision of a `versions/<n>` key
    pub fn find_name_by_version(
        &self,
        key: &str,
    ) -> Option<(String, u64)> {
        let caps = self.patterns.versions.captures(key)?;
        let version = caps.get(2)?.as_str().parse().ok()?;
        Some((caps.get(1)?.as_str().to_string(), version))
    }

    pub fn find_name_by_active_version(
        &self,
        key: &str,
    ) -> Option<String> {
        let caps = self.patterns.active_version.captures(key)?;
        Some(caps.get(1)?.as_str().to_string())
    }

    pub fn find_name_by_item_path(
        &self,
        key: &str,
    ) -> Option<String> {
        let caps = self.patterns.item.captures(key)?;
        Some(caps.get(1)?.as_str().to_string())
    }

    fn classify(
        &self,
        key: &str,
    ) -> Option<(String, RuleItemPathShape)> {
        if let Some((name, version)) = self.find_name_by_version(key) {
            return Some((name, RuleItemPathShape::Version(version)));
        }
        if let Some(name) = self.find_name_by_active_version(key) {
            return Some((name, RuleItemPathShape::ActiveVersion));
        }
        self.find_name_by_item_path(key)
            .map(|name| (name, RuleItemPathShape::Item))
    }
}

/// Path of a singleton rule item
#[derive(Debug, Clone)]
pub struct UniqueRuleItemNodePath {
    path: VersionNodePath,
    patterns: PatternTriple,
}

impl UniqueRuleItemNodePath {
    pub fn new(
        root: &str,
        item_type: &str,
    ) -> Result<Self> {
        check_segment(item_type)?;
        let item_path = format!("{}{}", root, item_type);
        Ok(Self {
            patterns: PatternTriple::new(&regex::escape(&item_path))?,
            path: VersionNodePath::new(item_path),
        })
    }

    pub fn path(&self) -> &VersionNodePath {
        &self.path
    }

    pub fn find_version(
        &self,
        key: &str,
    ) -> Option<u64> {
        let caps = self.patterns.versions.captures(key)?;
        caps.get(1)?.as_str().parse().ok()
    }

    pub fn is_active_version_path(
        &self,
        key: &str,
    ) -> bool {
        self.patterns.active_version.is_match(key)
    }

    pub fn is_item_path(
        &self,
        key: &str,
    ) -> bool {
        self.patterns.item.is_match(key)
    }

    fn classify(
        &self,
        key: &str,
    ) -> Option<RuleItemPathShape> {
        if let Some(version) = self.find_version(key) {
            return Some(RuleItemPathShape::Version(version));
        }
        if self.is_active_version_path(key) {
            return Some(RuleItemPathShape::ActiveVersion);
        }
        self.is_item_path(key).then_some(RuleItemPathShape::Item)
    }
}

#[derive(Debug, Clone)]
enum RuleItemNodePath {
    Named(NamedRuleItemNodePath),
    Unique(UniqueRuleItemNodePath),
}

/// Table of every rule item type under one rule root, built once at startup
#[derive(Debug, Clone)]
pub struct RuleNodePath {
    root: String,
    items: BTreeMap<String, RuleItemNodePath>,
}

impl RuleNodePath {
    pub fn new(
        root: impl Into<String>,
        named_types: &[&str],
        unique_types: &[&str],
    ) -> Result<Self> {
        let root = root.into();
        let mut items = BTreeMap::new();

        for item_type in named_types {
            let path = RuleItemNodePath::Named(NamedRuleItemNodePath::new(&root, item_type)?);
            if items.insert(item_type.to_string(), path).is_some() {
                return Err(PathError::DuplicateRuleType(item_type.to_string()).into());
            }
        }
        for item_type in unique_types {
            let path = RuleItemNodePath::Unique(UniqueRuleItemNodePath::new(&root, item_type)?);
            if items.insert(item_type.to_string(), path).is_some() {
                return Err(PathError::DuplicateRuleType(item_type.to_string()).into());
            }
        }

        Ok(Self { root, items })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn named(
        &self,
        item_type: &str,
    ) -> Result<&NamedRuleItemNodePath> {
        match self.items.get(item_type) {
            Some(RuleItemNodePath::Named(path)) => Ok(path),
            _ => Err(PathError::UnknownRuleType(item_type.to_string()).into()),
        }
    }

    pub fn unique(
        &self,
        item_type: &str,
    ) -> Result<&UniqueRuleItemNodePath> {
        match self.items.get(item_type) {
            Some(RuleItemNodePath::Unique(path)) => Ok(path),
            _ => Err(PathError::UnknownRuleType(item_type.to_string()).into()),
        }
    }

    /// Classify `key` as a key of some registered rule item
    pub fn find_rule_item(
        &self,
        key: &str,
    ) -> Option<RuleItemPathMatch> {
        let rest = key.strip_prefix(self.root.as_str())?;
        // The type is the first segment after the root
        let item_type = rest.split('/').next()?;

        match self.items.get(item_type)? {
            RuleItemNodePath::Named(path) => {
                path.classify(key).map(|(name, shape)| RuleItemPathMatch {
                    item_type: item_type.to_string(),
                    name: Some(name),
                    shape,
                })
            }
            RuleItemNodePath::Unique(path) => path.classify(key).map(|shape| RuleItemPathMatch {
                item_type: item_type.to_string(),
                name: None,
                shape,
            }),
        }
    }
}

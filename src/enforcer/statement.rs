//! Typed nft statements and their textual rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::CompileError;
use crate::classifier::{AddressRange, Family};

/// Longest table or set name nft accepts in practice.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Validate that an IP/CIDR string is safe for nft script inclusion.
///
/// `AddressRange` rendering is already safe; this is checked again before
/// any text reaches the engine.
pub fn is_safe_nft_element(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c)
        })
}

/// `[A-Za-z_][A-Za-z0-9_]*`, bounded in length.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// nft table family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFamily {
    Ip,
    Ip6,
    #[default]
    Inet,
}

impl TableFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFamily::Ip => "ip",
            TableFamily::Ip6 => "ip6",
            TableFamily::Inet => "inet",
        }
    }

    /// Whether a set of addresses of `family` can live in a table of this family.
    pub fn holds(&self, family: Family) -> bool {
        matches!(
            (self, family),
            (TableFamily::Inet, _) | (TableFamily::Ip, Family::V4) | (TableFamily::Ip6, Family::V6)
        )
    }
}

impl fmt::Display for TableFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table, e.g. `inet filter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub family: TableFamily,
    pub name: String,
}

impl TableId {
    pub fn new(family: TableFamily, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.name)
    }
}

/// A named set inside a table, e.g. `inet filter github_actions_ipv4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetId {
    pub table: TableId,
    pub name: String,
}

impl SetId {
    pub fn new(table: TableId, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
        }
    }

    /// Arguments for a standalone `nft delete set` invocation.
    pub fn delete_args(&self) -> Vec<String> {
        vec![
            "delete".to_string(),
            "set".to_string(),
            self.table.family.to_string(),
            self.table.name.clone(),
            self.name.clone(),
        ]
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.table, self.name)
    }
}

/// Set declaration. Always an interval set with auto-merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSpec {
    pub id: SetId,
    pub family: Family,
}

impl SetSpec {
    pub fn new(id: SetId, family: Family) -> Self {
        Self { id, family }
    }

    pub fn element_type(&self) -> &'static str {
        match self.family {
            Family::V4 => "ipv4_addr",
            Family::V6 => "ipv6_addr",
        }
    }
}

/// A non-empty list of ranges of a single family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementList {
    family: Family,
    ranges: Vec<AddressRange>,
}

impl ElementList {
    pub fn new(ranges: Vec<AddressRange>) -> Result<Self, CompileError> {
        let family = match ranges.first() {
            Some(first) => first.family(),
            None => return Err(CompileError::EmptyElements),
        };
        for range in &ranges {
            if range.family() != family {
                return Err(CompileError::MixedFamilies(range.to_string()));
            }
            let text = range.to_string();
            if !is_safe_nft_element(&text) {
                return Err(CompileError::UnsafeElement(text));
            }
        }
        Ok(Self { family, ranges })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }
}

impl fmt::Display for ElementList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", range)?;
        }
        f.write_str(" }")
    }
}

/// Ordering class of a statement inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Table,
    Set,
    Flush,
    Populate,
}

/// A single nft statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    AddTable(TableId),
    AddSet(SetSpec),
    FlushSet(SetId),
    AddElements(SetId, ElementList),
    /// Only ever issued on its own, never inside a batch.
    DeleteSet(SetId),
}

impl Statement {
    /// `None` for statements that cannot be part of a batch.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Statement::AddTable(_) => Some(Phase::Table),
            Statement::AddSet(_) => Some(Phase::Set),
            Statement::FlushSet(_) => Some(Phase::Flush),
            Statement::AddElements(..) => Some(Phase::Populate),
            Statement::DeleteSet(_) => None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::AddTable(table) => write!(f, "add table {}", table),
            Statement::AddSet(spec) => write!(
                f,
                "add set {} {{ type {}; flags interval; auto-merge; }}",
                spec.id,
                spec.element_type()
            ),
            Statement::FlushSet(set) => write!(f, "flush set {}", set),
            Statement::AddElements(set, elements) => {
                write!(f, "add element {} {}", set, elements)
            }
            Statement::DeleteSet(set) => write!(f, "delete set {}", set),
        }
    }
}

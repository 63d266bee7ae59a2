//! Renders a target state into an ordered mutation batch.
//!
//! The batch is a fixed template, not a diff against the live ruleset:
//!
//! ```text
//! add table   <table>
//! add set     <v4 set> { type ipv4_addr; flags interval; auto-merge; }
//! add set     <v6 set> { type ipv6_addr; flags interval; auto-merge; }
//! flush set   <v4 set>
//! flush set   <v6 set>
//! add element <v4 set> { ... }
//! add element <v6 set> { ... }
//! ```
//!
//! Published range lists are replaced wholesale upstream, so flush + add is
//! both simpler than an incremental patch and safe to re-apply. A family with
//! no ranges gets neither flush nor add, which leaves the contents of an
//! existing set in place.

use std::fmt;
use thiserror::Error;

use super::statement::{
    is_valid_identifier, ElementList, Phase, SetId, SetSpec, Statement, TableId,
};
use crate::classifier::{AddressRange, Classified, Family};
use crate::config::Config;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("refusing to render an empty element list")]
    EmptyElements,

    #[error("element {0} does not belong to the set's address family")]
    MixedFamilies(String),

    #[error("unsafe element {0:?}")]
    UnsafeElement(String),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("`{statement}` cannot follow a {after:?} statement")]
    OutOfOrder { statement: String, after: Phase },

    #[error("`{0}` refers to a table not declared in the batch")]
    UndeclaredTable(String),

    #[error("`{0}` refers to a set not declared in the batch")]
    UndeclaredSet(String),

    #[error("`{0}` cannot be part of a batch")]
    NotBatchable(String),
}

/// Ordered statements submitted to the engine as one transaction.
///
/// Statements can only be appended in phase order, and only against tables
/// and sets the batch itself declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    statements: Vec<Statement>,
    tables: Vec<TableId>,
    sets: Vec<SetSpec>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) -> Result<(), CompileError> {
        let phase = statement
            .phase()
            .ok_or_else(|| CompileError::NotBatchable(statement.to_string()))?;

        if let Some(last) = self.statements.last().and_then(Statement::phase) {
            if phase < last {
                return Err(CompileError::OutOfOrder {
                    statement: statement.to_string(),
                    after: last,
                });
            }
        }

        match &statement {
            Statement::AddTable(table) => {
                check_identifier(&table.name)?;
                if !self.tables.contains(table) {
                    self.tables.push(table.clone());
                }
            }
            Statement::AddSet(spec) => {
                check_identifier(&spec.id.name)?;
                if !self.tables.contains(&spec.id.table) || !spec.id.table.family.holds(spec.family)
                {
                    return Err(CompileError::UndeclaredTable(statement.to_string()));
                }
                if !self.sets.contains(spec) {
                    self.sets.push(spec.clone());
                }
            }
            Statement::FlushSet(set) => {
                self.declared(set)
                    .ok_or_else(|| CompileError::UndeclaredSet(statement.to_string()))?;
            }
            Statement::AddElements(set, elements) => {
                let spec = self
                    .declared(set)
                    .ok_or_else(|| CompileError::UndeclaredSet(statement.to_string()))?;
                if spec.family != elements.family() {
                    let first = elements
                        .ranges()
                        .first()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    return Err(CompileError::MixedFamilies(first));
                }
            }
            Statement::DeleteSet(_) => {
                return Err(CompileError::NotBatchable(statement.to_string()));
            }
        }

        self.statements.push(statement);
        Ok(())
    }

    fn declared(&self, set: &SetId) -> Option<&SetSpec> {
        self.sets.iter().find(|spec| &spec.id == set)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The script text fed to `nft -f -`.
    pub fn script(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MutationBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), CompileError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(CompileError::InvalidIdentifier(name.to_string()))
    }
}

/// Desired contents of the managed table and its two sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState {
    pub table: TableId,
    pub v4_set: SetId,
    pub v6_set: SetId,
    pub v4: Vec<AddressRange>,
    pub v6: Vec<AddressRange>,
}

impl TargetState {
    pub fn new(config: &Config, classified: Classified) -> Self {
        let table = config.table();
        Self {
            v4_set: SetId::new(table.clone(), config.ipv4_set.clone()),
            v6_set: SetId::new(table.clone(), config.ipv6_set.clone()),
            table,
            v4: classified.v4,
            v6: classified.v6,
        }
    }

    fn families(&self) -> [(&SetId, Family, &[AddressRange]); 2] {
        [
            (&self.v4_set, Family::V4, self.v4.as_slice()),
            (&self.v6_set, Family::V6, self.v6.as_slice()),
        ]
    }
}

/// Render `target` into a batch. Deterministic for a given target.
pub fn compile(target: &TargetState) -> Result<MutationBatch, CompileError> {
    let mut batch = MutationBatch::new();

    batch.push(Statement::AddTable(target.table.clone()))?;

    for (set, family, _) in target.families() {
        batch.push(Statement::AddSet(SetSpec::new(set.clone(), family)))?;
    }

    for (set, _, ranges) in target.families() {
        if !ranges.is_empty() {
            batch.push(Statement::FlushSet(set.clone()))?;
        }
    }

    for (set, _, ranges) in target.families() {
        if !ranges.is_empty() {
            let elements = ElementList::new(ranges.to_vec())?;
            batch.push(Statement::AddElements(set.clone(), elements))?;
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::enforcer::statement::TableFamily;

    fn target(raw: &[&str]) -> TargetState {
        TargetState::new(&Config::default(), classify(raw))
    }

    fn table() -> TableId {
        TableId::new(TableFamily::Inet, "filter")
    }

    #[test]
    fn test_compile_full_template() {
        let batch = compile(&target(&["192.30.252.0/22", "2a0a:a440::/29", "not-a-cidr"])).unwrap();
        let expected = "\
add table inet filter
add set inet filter github_actions_ipv4 { type ipv4_addr; flags interval; auto-merge; }
add set inet filter github_actions_ipv6 { type ipv6_addr; flags interval; auto-merge; }
flush set inet filter github_actions_ipv4
flush set inet filter github_actions_ipv6
add element inet filter github_actions_ipv4 { 192.30.252.0/22 }
add element inet filter github_actions_ipv6 { 2a0a:a440::/29 }
";
        assert_eq!(batch.script(), expected);
        assert_eq!(batch.len(), 7);
    }

    #[test]
    fn test_compile_one_flush_and_add_per_family() {
        let batch = compile(&target(&[
            "10.0.0.0/8",
            "fd00::/8",
            "172.16.0.0/12",
            "2001:db8::/32",
        ]))
        .unwrap();
        let script = batch.script();

        assert_eq!(script.matches("flush set").count(), 2);
        assert_eq!(script.matches("add element").count(), 2);
        assert!(script
            .contains("add element inet filter github_actions_ipv4 { 10.0.0.0/8, 172.16.0.0/12 }"));
        assert!(script
            .contains("add element inet filter github_actions_ipv6 { fd00::/8, 2001:db8::/32 }"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let state = target(&["10.0.0.0/8", "fd00::/8", "192.168.0.0/16"]);
        assert_eq!(compile(&state).unwrap().script(), compile(&state).unwrap().script());
    }

    #[test]
    fn test_compile_empty_family_is_left_untouched() {
        let batch = compile(&target(&["10.0.0.0/8"])).unwrap();
        let script = batch.script();

        assert!(script.contains("add set inet filter github_actions_ipv6"));
        assert!(!script.contains("flush set inet filter github_actions_ipv6"));
        assert!(!script.contains("add element inet filter github_actions_ipv6"));
        assert!(!script.contains("{  }"));
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn test_compile_rejects_invalid_identifiers() {
        let mut state = target(&["10.0.0.0/8"]);
        state.v4_set = SetId::new(table(), "bad name; flush ruleset");
        assert!(matches!(
            compile(&state),
            Err(CompileError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let set = SetId::new(table(), "s4");
        let mut batch = MutationBatch::new();
        batch.push(Statement::AddTable(table())).unwrap();
        batch
            .push(Statement::AddSet(SetSpec::new(set.clone(), Family::V4)))
            .unwrap();
        batch.push(Statement::FlushSet(set.clone())).unwrap();

        let err = batch
            .push(Statement::AddSet(SetSpec::new(
                SetId::new(table(), "late"),
                Family::V4,
            )))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::OutOfOrder {
                after: Phase::Flush,
                ..
            }
        ));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_push_rejects_undeclared_set() {
        let mut batch = MutationBatch::new();
        batch.push(Statement::AddTable(table())).unwrap();
        let err = batch
            .push(Statement::FlushSet(SetId::new(table(), "missing")))
            .unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredSet(_)));
    }

    #[test]
    fn test_push_rejects_set_without_table() {
        let mut batch = MutationBatch::new();
        let err = batch
            .push(Statement::AddSet(SetSpec::new(
                SetId::new(table(), "s4"),
                Family::V4,
            )))
            .unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredTable(_)));
    }

    #[test]
    fn test_push_rejects_v6_set_in_ip_table() {
        let ip = TableId::new(TableFamily::Ip, "filter");
        let mut batch = MutationBatch::new();
        batch.push(Statement::AddTable(ip.clone())).unwrap();
        let err = batch
            .push(Statement::AddSet(SetSpec::new(SetId::new(ip, "s6"), Family::V6)))
            .unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredTable(_)));
    }

    #[test]
    fn test_push_rejects_family_mismatch() {
        let set = SetId::new(table(), "s4");
        let mut batch = MutationBatch::new();
        batch.push(Statement::AddTable(table())).unwrap();
        batch
            .push(Statement::AddSet(SetSpec::new(set.clone(), Family::V4)))
            .unwrap();
        let v6 = ElementList::new(vec![AddressRange::parse("fd00::/8").unwrap()]).unwrap();
        let err = batch.push(Statement::AddElements(set, v6)).unwrap_err();
        assert!(matches!(err, CompileError::MixedFamilies(_)));
    }

    #[test]
    fn test_push_rejects_delete() {
        let mut batch = MutationBatch::new();
        let err = batch
            .push(Statement::DeleteSet(SetId::new(table(), "s4")))
            .unwrap_err();
        assert!(matches!(err, CompileError::NotBatchable(_)));
        assert!(batch.is_empty());
    }
}

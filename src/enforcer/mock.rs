//! In-memory nft stand-in for tests.
//!
//! Understands the statements this crate emits, applies a script as one
//! transaction (work on a copy, commit only if every line succeeds) and
//! reports errors with nft's errno wording.

use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use super::statement::SetId;
use crate::classifier::Family;
use crate::cmd_abstraction::{CommandExecutor, CommandOutput};
use crate::error::SyncError;

type SetKey = (String, String, String);

#[derive(Debug, Clone)]
struct FakeSet {
    element_type: String,
    elements: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Ruleset {
    tables: BTreeSet<(String, String)>,
    sets: BTreeMap<SetKey, FakeSet>,
}

fn key(set: &SetId) -> SetKey {
    (
        set.table.family.to_string(),
        set.table.name.clone(),
        set.name.clone(),
    )
}

fn element_type(family: Family) -> &'static str {
    match family {
        Family::V4 => "ipv4_addr",
        Family::V6 => "ipv6_addr",
    }
}

/// Fake nft engine tracking tables, sets and their elements.
#[derive(Default)]
pub struct FakeNft {
    ruleset: Mutex<Ruleset>,
    referenced: Mutex<HashSet<SetKey>>,
    reject_next: Mutex<Option<String>>,
    scripts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<Vec<String>>>,
}

impl FakeNft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set (and its table) with the given contents.
    pub fn seed_set(&self, set: &SetId, family: Family, elements: &[&str]) {
        let mut ruleset = self.ruleset.lock().unwrap();
        ruleset
            .tables
            .insert((set.table.family.to_string(), set.table.name.clone()));
        ruleset.sets.insert(
            key(set),
            FakeSet {
                element_type: element_type(family).to_string(),
                elements: elements.iter().map(|e| e.to_string()).collect(),
            },
        );
    }

    /// Pretend a rule references `set`, so deleting it fails with EBUSY.
    pub fn mark_referenced(&self, set: &SetId) {
        self.referenced.lock().unwrap().insert(key(set));
    }

    /// Fail the next script with `stderr`, without touching state.
    pub fn reject_next_batch(&self, stderr: &str) {
        *self.reject_next.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn has_set(&self, set: &SetId) -> bool {
        self.ruleset.lock().unwrap().sets.contains_key(&key(set))
    }

    pub fn set_elements(&self, set: &SetId) -> Option<Vec<String>> {
        self.ruleset
            .lock()
            .unwrap()
            .sets
            .get(&key(set))
            .map(|s| s.elements.clone())
    }

    /// Scripts received on stdin, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    /// Argument vectors of standalone invocations, in order.
    pub fn deletes(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }

    fn delete_set(
        &self,
        ruleset: &mut Ruleset,
        set_key: SetKey,
    ) -> Result<(), &'static str> {
        if !ruleset.sets.contains_key(&set_key) {
            return Err("No such file or directory");
        }
        if self.referenced.lock().unwrap().contains(&set_key) {
            return Err("Device or resource busy");
        }
        ruleset.sets.remove(&set_key);
        Ok(())
    }

    fn apply_line(&self, ruleset: &mut Ruleset, line: &str) -> Result<(), &'static str> {
        let (head, body) = match line.find('{') {
            Some(i) => {
                let body = line[i + 1..]
                    .trim_end()
                    .strip_suffix('}')
                    .ok_or("syntax error, unexpected end of file")?;
                (&line[..i], Some(body.trim()))
            }
            None => (line, None),
        };
        let words: Vec<&str> = head.split_whitespace().collect();

        match words.as_slice() {
            ["add", "table", family, table] => {
                ruleset
                    .tables
                    .insert((family.to_string(), table.to_string()));
                Ok(())
            }
            ["add", "set", family, table, name] => {
                let ty = body
                    .and_then(|b| b.split(';').find_map(|p| p.trim().strip_prefix("type ")))
                    .ok_or("syntax error, unexpected '}'")?;
                if !ruleset
                    .tables
                    .contains(&(family.to_string(), table.to_string()))
                {
                    return Err("No such file or directory");
                }
                let set_key = (family.to_string(), table.to_string(), name.to_string());
                match ruleset.sets.get(&set_key) {
                    Some(existing) if existing.element_type != ty => Err("File exists"),
                    Some(_) => Ok(()),
                    None => {
                        ruleset.sets.insert(
                            set_key,
                            FakeSet {
                                element_type: ty.trim().to_string(),
                                elements: Vec::new(),
                            },
                        );
                        Ok(())
                    }
                }
            }
            ["flush", "set", family, table, name] => {
                let set_key = (family.to_string(), table.to_string(), name.to_string());
                let set = ruleset
                    .sets
                    .get_mut(&set_key)
                    .ok_or("No such file or directory")?;
                set.elements.clear();
                Ok(())
            }
            ["add", "element", family, table, name] => {
                let elements: Vec<&str> = body
                    .ok_or("syntax error")?
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .collect();
                if elements.is_empty() {
                    return Err("syntax error, unexpected '}'");
                }
                let set_key = (family.to_string(), table.to_string(), name.to_string());
                let set = ruleset
                    .sets
                    .get_mut(&set_key)
                    .ok_or("No such file or directory")?;
                for element in elements {
                    let net: IpNet = element.parse().map_err(|_| "syntax error")?;
                    let fits = matches!(
                        (&net, set.element_type.as_str()),
                        (IpNet::V4(_), "ipv4_addr") | (IpNet::V6(_), "ipv6_addr")
                    );
                    if !fits {
                        return Err("datatype mismatch");
                    }
                    if !set.elements.iter().any(|e| e == element) {
                        set.elements.push(element.to_string());
                    }
                }
                Ok(())
            }
            ["delete", "set", family, table, name] => self.delete_set(
                ruleset,
                (family.to_string(), table.to_string(), name.to_string()),
            ),
            _ => Err("syntax error"),
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeNft {
    async fn execute(&self, _cmd: &str, args: &[String]) -> Result<CommandOutput, SyncError> {
        self.deletes.lock().unwrap().push(args.to_vec());

        let result = match args {
            [verb, object, family, table, name] if verb == "delete" && object == "set" => {
                let mut ruleset = self.ruleset.lock().unwrap();
                self.delete_set(&mut ruleset, (family.clone(), table.clone(), name.clone()))
            }
            _ => Err("syntax error"),
        };

        Ok(match result {
            Ok(()) => CommandOutput::ok(),
            Err(reason) => CommandOutput::failed(
                1,
                format!(
                    "Error: Could not process rule: {}\n{}\n",
                    reason,
                    args.join(" ")
                ),
            ),
        })
    }

    async fn execute_with_stdin(
        &self,
        _cmd: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<CommandOutput, SyncError> {
        self.scripts.lock().unwrap().push(stdin.to_string());

        if let Some(stderr) = self.reject_next.lock().unwrap().take() {
            return Ok(CommandOutput::failed(1, stderr));
        }

        let check_only = args.first().map(String::as_str) == Some("--check");
        let mut ruleset = self.ruleset.lock().unwrap();
        let mut working = ruleset.clone();

        for (n, line) in stdin.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(reason) = self.apply_line(&mut working, line) {
                return Ok(CommandOutput::failed(
                    1,
                    format!(
                        "/dev/stdin:{}:1-{}: Error: Could not process rule: {}\n{}\n",
                        n + 1,
                        line.len(),
                        reason,
                        line
                    ),
                ));
            }
        }

        if !check_only {
            *ruleset = working;
        }
        Ok(CommandOutput::ok())
    }
}

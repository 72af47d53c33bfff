use super::statement::AssignOp;
use crate::consts::EXPANSION_REGEX;
use regex::Captures;
use std::collections::{BTreeMap, HashMap};

/// References nested deeper than this are left unexpanded.
const MAX_EXPANSION_DEPTH: usize = 16;
/// Bytes a single read may resolve before remaining references are left
/// unexpanded. Bounds values that reference themselves several times.
const MAX_EXPANSION_BYTES: usize = 1 << 18;

const OVERRIDE_SUFFIXES: [(&str, Override); 6] = [
    (":append", Override::Append),
    (":prepend", Override::Prepend),
    (":remove", Override::Remove),
    ("_append", Override::Append),
    ("_prepend", Override::Prepend),
    ("_remove", Override::Remove),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Override {
    Append,
    Prepend,
    Remove,
}

/// Variable store for a single evaluation.
///
/// Values are kept unexpanded; `${VAR}` references are resolved on read so
/// that later assignments are visible to earlier references, as in BitBake.
/// `${@...}` python expressions are never evaluated and stay in the value.
#[derive(Debug, Clone, Default)]
pub(crate) struct DataStore {
    vars: HashMap<String, String>,
    weak: HashMap<String, String>,
    overrides: HashMap<String, Vec<(Override, String)>>,
}
impl DataStore {
    pub(crate) fn from_vars<'a>(vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn set(&mut self, var: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(var.into(), value.into());
    }

    pub(crate) fn unset(&mut self, var: &str) {
        self.vars.remove(var);
        self.weak.remove(var);
        self.overrides.remove(var);
    }

    pub(crate) fn apply(&mut self, var: &str, op: AssignOp, value: &str) {
        for (suffix, kind) in OVERRIDE_SUFFIXES {
            if let Some(base) = var.strip_suffix(suffix)
                && !base.is_empty()
            {
                self.overrides.entry(base.to_string()).or_default().push((kind, value.to_string()));
                return;
            }
        }
        let current = self.vars.get(var).map(String::as_str).unwrap_or_default();
        let updated = match op {
            AssignOp::Set => value.to_string(),
            AssignOp::Default => {
                if self.vars.contains_key(var) {
                    return;
                }
                value.to_string()
            },
            AssignOp::WeakDefault => {
                self.weak.insert(var.to_string(), value.to_string());
                return;
            },
            AssignOp::Immediate => self.expand(value),
            AssignOp::Append => format!("{current} {value}"),
            AssignOp::Prepend => format!("{value} {current}"),
            AssignOp::AppendNoSpace => format!("{current}{value}"),
            AssignOp::PrependNoSpace => format!("{value}{current}"),
        };
        self.vars.insert(var.to_string(), updated);
    }

    /// Fully resolved value of a variable.
    pub(crate) fn get(&self, var: &str) -> Option<String> {
        let mut budget = MAX_EXPANSION_BYTES;
        self.lookup(var, 0, &mut budget)
    }

    /// Resolve every `${VAR}` reference in `value` that names a known variable.
    pub(crate) fn expand(&self, value: &str) -> String {
        let mut budget = MAX_EXPANSION_BYTES;
        self.expand_at(value, 0, &mut budget)
    }

    /// Every known variable, fully resolved.
    pub(crate) fn finalize(&self) -> BTreeMap<String, String> {
        let names = self.vars.keys().chain(self.weak.keys()).chain(self.overrides.keys());
        names.filter_map(|name| self.get(name).map(|value| (name.clone(), value))).collect()
    }

    fn lookup(&self, var: &str, depth: usize, budget: &mut usize) -> Option<String> {
        let base = self.vars.get(var).or_else(|| self.weak.get(var));
        let overrides = self.overrides.get(var);
        if base.is_none() && overrides.is_none() {
            return None;
        }
        let mut value = base.cloned().unwrap_or_default();
        let mut removals = Vec::new();
        for (kind, extra) in overrides.into_iter().flatten() {
            match kind {
                Override::Append => value.push_str(extra),
                Override::Prepend => value.insert_str(0, extra),
                Override::Remove => removals.push(extra.as_str()),
            }
        }
        let value = self.expand_at(&value, depth, budget);
        if removals.is_empty() {
            return Some(value);
        }
        let removed: Vec<String> = removals
            .iter()
            .flat_map(|r| self.expand_at(r, depth, budget).split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        Some(value.split_whitespace().filter(|word| !removed.iter().any(|r| r == word)).collect::<Vec<_>>().join(" "))
    }

    fn expand_at(&self, value: &str, depth: usize, budget: &mut usize) -> String {
        if depth >= MAX_EXPANSION_DEPTH || !value.contains("${") {
            return value.to_string();
        }
        EXPANSION_REGEX
            .replace_all(value, |caps: &Captures| {
                if *budget == 0 {
                    return caps[0].to_string();
                }
                match self.lookup(&caps["var"], depth + 1, budget) {
                    Some(resolved) => {
                        *budget = budget.saturating_sub(resolved.len() + 1);
                        resolved
                    },
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

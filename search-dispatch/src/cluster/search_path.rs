//! Explicit routing of a query to a subset of the search cluster.
//!
//! A search path has the form `<nodes>/<group>`:
//!
//! * `nodes` is empty or `*` for all nodes of the group, or a comma-separated list of node
//!   indices (`0,2`) and half-open index ranges (`[1,3>`),
//! * `group` is empty or `*` for any group, or a single group id.
//!
//! `"/3"` selects all nodes of group 3, `"0,[2,4>/1"` selects nodes 0, 2 and 3 of group 1, and
//! `"1"` selects node 1 of a randomly chosen group.

use itertools::Itertools;
use rand::{rng, Rng};
use std::sync::Arc;

use crate::cluster::topology::{ClusterMetadata, Node};
use crate::error::{Error, Result};

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Selection {
    Single(usize),
    Range { from: usize, to: usize },
}

impl Selection {
    fn matches(self, max: usize) -> impl Iterator<Item = usize> {
        let (from, to) = match self {
            Selection::Single(index) => (index, index.saturating_add(1)),
            Selection::Range { from, to } => (from, to),
        };

        from.min(max)..to.min(max)
    }
}

/// Parsed search path.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SearchPath {
    nodes: Vec<Selection>,
    group: Option<u32>,
}

impl SearchPath {
    /// Parses a search path. Returns `None` when the path does not restrict anything: it is empty,
    /// consists of wildcards only, or spans multiple dispatch levels (contains `;`).
    pub fn parse(path: &str) -> Result<Option<SearchPath>> {
        if path.is_empty() || path.contains(';') {
            return Ok(None);
        }

        let invalid = || Error::InvalidSearchPath { path: path.into() };

        let (nodes, group) = match path.split_once('/') {
            Some((nodes, group)) => (nodes, group),
            None => (path, ""),
        };

        let nodes = parse_selections(nodes).ok_or_else(invalid)?;
        let group = parse_group(group).ok_or_else(invalid)?;

        if nodes.is_empty() && group.is_none() {
            Ok(None)
        } else {
            Ok(Some(SearchPath { nodes, group }))
        }
    }

    /// Resolves a search path string directly to nodes. An empty result means nothing matched and
    /// is not an error; only a malformed path is.
    pub fn select_nodes(path: &str, cluster: &ClusterMetadata) -> Result<Vec<Arc<Node>>> {
        Ok(Self::parse(path)?
            .map(|search_path| search_path.map_to_nodes(cluster))
            .unwrap_or_default())
    }

    /// Returns the selected group id, if any.
    #[inline]
    pub fn group(&self) -> Option<u32> {
        self.group
    }

    /// Maps this path to nodes of the given cluster snapshot.
    pub fn map_to_nodes(&self, cluster: &ClusterMetadata) -> Vec<Arc<Node>> {
        let groups = cluster.ordered_groups();
        if groups.is_empty() {
            return vec![];
        }

        let group = match self.group {
            Some(id) => match cluster.group(id) {
                Some(group) => group,
                None => return vec![],
            },
            None => &groups[rng().random_range(0..groups.len())],
        };

        if self.nodes.is_empty() {
            return group.nodes().to_vec();
        }

        let group_nodes = group.nodes();
        self.nodes
            .iter()
            .flat_map(|selection| selection.matches(group_nodes.len()))
            .sorted_unstable()
            .dedup()
            .map(|index| group_nodes[index].clone())
            .collect()
    }
}

// Returns an empty list for a wildcard and `None` for malformed input.
fn parse_selections(mut nodes: &str) -> Option<Vec<Selection>> {
    let mut result = vec![];

    while !nodes.is_empty() {
        if let Some(range) = nodes.strip_prefix('[') {
            let (range, rest) = range.split_once('>')?;
            let (from, to) = range.split_once(',')?;
            let from = parse_index(from)?;
            let to = parse_index(to)?;
            if from > to {
                return None;
            }

            result.push(Selection::Range { from, to });
            nodes = strip_separator(rest)?;
        } else {
            let (element, rest) = match nodes.split_once(',') {
                Some((_, "")) => return None,
                Some((element, rest)) => (element, rest),
                None => (nodes, ""),
            };
            if element == WILDCARD {
                return Some(vec![]);
            }

            result.push(Selection::Single(parse_index(element)?));
            nodes = rest;
        }
    }

    Some(result)
}

fn strip_separator(rest: &str) -> Option<&str> {
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(',').filter(|rest| !rest.is_empty())
    }
}

fn parse_index(value: &str) -> Option<usize> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    value.parse().ok()
}

// Outer `None` marks malformed input.
fn parse_group(group: &str) -> Option<Option<u32>> {
    if group.is_empty() || group == WILDCARD {
        return Some(None);
    }

    if !group.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    group.parse().ok().map(Some)
}

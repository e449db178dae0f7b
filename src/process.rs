//! Process forest built from a flat `pid ppid command` snapshot.
//!
//! Nodes live in an arena ([`ProcessForest`]) in snapshot order and refer
//! to their children by [`NodeId`].  Nothing points back to a parent; every
//! traversal in [`query`](crate::query) goes top-down.

use serde::Serialize;
use std::collections::HashMap;

/// Index of a node inside its [`ProcessForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A single process at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNode {
    pub pid: u32,
    pub parent_pid: u32,
    pub command: String,
    children: Vec<NodeId>,
}

impl ProcessNode {
    /// Direct children, in snapshot order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A malformed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed process row {row:?}: expected `<pid> <ppid> <command>`")]
    MalformedRow { row: String },
    #[error("pid {pid} appears more than once in the snapshot")]
    DuplicatePid { pid: u32 },
}

/// Every process of one snapshot, arranged as a forest.
#[derive(Debug, Clone, Default)]
pub struct ProcessForest {
    nodes: Vec<ProcessNode>,
    roots: Vec<NodeId>,
    by_pid: HashMap<u32, NodeId>,
}

/// Split one snapshot row into `(pid, ppid, command)`.
fn parse_row(row: &str) -> Result<(u32, u32, String), ParseError> {
    let malformed = || ParseError::MalformedRow {
        row: row.to_string(),
    };
    let mut rest = row.trim();
    let mut field = || -> Option<u32> {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(end);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest = tail.trim_start();
        digits.parse().ok()
    };
    let pid = field().ok_or_else(malformed)?;
    let parent_pid = field().ok_or_else(malformed)?;
    Ok((pid, parent_pid, rest.to_string()))
}

impl ProcessForest {
    /// Build a forest from snapshot rows.
    ///
    /// Every row must look like `<pid> <ppid> <command>`; the first row that
    /// does not aborts the build.  Roots are the nodes whose parent pid is
    /// not in the snapshot, in snapshot order.
    pub fn parse<I, S>(rows: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes = Vec::new();
        let mut by_pid = HashMap::new();

        for row in rows {
            let (pid, parent_pid, command) = parse_row(row.as_ref())?;
            let id = NodeId(nodes.len());
            if by_pid.insert(pid, id).is_some() {
                return Err(ParseError::DuplicatePid { pid });
            }
            nodes.push(ProcessNode {
                pid,
                parent_pid,
                command,
                children: Vec::new(),
            });
        }

        let mut roots = Vec::new();
        for index in 0..nodes.len() {
            let id = NodeId(index);
            match by_pid.get(&nodes[index].parent_pid) {
                // pid 0 rows (the kernel scheduler on some systems) name
                // themselves as parent; keep them out of their own child list.
                Some(&parent) if parent != id => nodes[parent.0].children.push(id),
                _ => roots.push(id),
            }
        }

        Ok(Self {
            nodes,
            roots,
            by_pid,
        })
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> &ProcessNode {
        &self.nodes[id.0]
    }

    pub fn find_pid(&self, pid: u32) -> Option<&ProcessNode> {
        self.by_pid.get(&pid).map(|&id| self.get(id))
    }

    /// Look up the id of the node for `pid`.
    pub fn id_of(&self, pid: u32) -> Option<NodeId> {
        self.by_pid.get(&pid).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nested, serializable copy of the forest (used by `deskplan pstree`).
    pub fn to_tree(&self) -> Vec<ProcessTree> {
        self.roots.iter().map(|&id| self.subtree(id, None)).collect()
    }

    /// Nested copy of the subtree at `id`.
    ///
    /// With `max_depth = Some(0)` the children are elided and reported as
    /// `"[...]"`, matching how `test-locators` prints a matched process.
    pub fn subtree(&self, id: NodeId, max_depth: Option<usize>) -> ProcessTree {
        let node = self.get(id);
        let children = match max_depth {
            Some(0) if !node.children.is_empty() => Children::Elided,
            _ => Children::Nodes(
                node.children
                    .iter()
                    .map(|&child| self.subtree(child, max_depth.map(|d| d.saturating_sub(1))))
                    .collect(),
            ),
        };
        ProcessTree {
            pid: node.pid,
            parent_pid: node.parent_pid,
            command: node.command.clone(),
            children,
        }
    }
}

/// Owned, nested view of a process and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessTree {
    pub pid: u32,
    pub parent_pid: u32,
    pub command: String,
    pub children: Children,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    Nodes(Vec<ProcessTree>),
    Elided,
}

impl Serialize for Children {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Children::Nodes(nodes) => nodes.serialize(serializer),
            Children::Elided => serializer.serialize_str("[...]"),
        }
    }
}

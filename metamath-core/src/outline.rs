//! The database outline: the header tree, and header and comment paths.
//!
//! Header comments split the database into major parts, sections,
//! subsections and subsubsections.  The outline is a tree of those headers,
//! each holding the statements located between it and the next header.
//!
//! Headers are addressed by paths of 1-based sibling indices, like `3.1.2`.
//! Comments are addressed by a header path, `#` and the 1-based index of the
//! comment among the header's content, like `3.1#2` (or `#2` at the root).

use crate::diag::Diagnostic;
use crate::statement::{CommentKind, HeadingLevel, Statement, StatementEntry, StatementIndex};
use regex::Regex;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::OnceLock;

/// Maximal depth of a header path.
pub const MAX_HEADER_DEPTH: usize = 4;

/// The path of a header in the outline, as 1-based sibling indices.
/// The empty path designates the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HeaderPath(pub Vec<usize>);

impl HeaderPath {
    /// The root of the outline.
    #[must_use]
    pub const fn root() -> Self {
        HeaderPath(Vec::new())
    }

    /// Number of indices in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Splits the path into its parent and its last index.
    #[must_use]
    pub fn split_last(&self) -> Option<(HeaderPath, usize)> {
        let (&last, parent) = self.0.split_last()?;
        Some((HeaderPath(parent.to_vec()), last))
    }
}

impl FromStr for HeaderPath {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static HEADER_PATH: OnceLock<Regex> = OnceLock::new();
        let regex = HEADER_PATH.get_or_init(|| Regex::new(r"^[0-9]+(?:\.[0-9]+){0,3}$").unwrap());
        if !regex.is_match(s) {
            return Err(Diagnostic::InvalidHeaderPathFormat);
        }
        let indices = s
            .split('.')
            .map(|part| part.parse::<usize>().ok().filter(|&i| i > 0))
            .collect::<Option<Vec<_>>>()
            .ok_or(Diagnostic::InvalidHeaderPathFormat)?;
        Ok(HeaderPath(indices))
    }
}

impl Display for HeaderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

/// The path of a comment: the path of its header and its 1-based index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommentPath {
    /// The header holding the comment.
    pub header: HeaderPath,
    /// Index among the comments of the header, starting at 1.
    pub index: usize,
}

impl FromStr for CommentPath {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (header, index) = s.split_once('#').ok_or(Diagnostic::InvalidCommentPathFormat)?;
        let header = if header.is_empty() {
            HeaderPath::root()
        } else {
            header
                .parse()
                .map_err(|_| Diagnostic::InvalidCommentPathFormat)?
        };
        let index = (!index.is_empty() && index.bytes().all(|c| c.is_ascii_digit()))
            .then(|| index.parse::<usize>().ok())
            .flatten()
            .filter(|&i| i > 0)
            .ok_or(Diagnostic::InvalidCommentPathFormat)?;
        Ok(CommentPath { header, index })
    }
}

impl Display for CommentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.header, self.index)
    }
}

/// Identifier of a node of the outline.
pub type NodeId = usize;

/// A node of the header tree.
#[derive(Debug, Clone)]
pub struct OutlineNode {
    /// Title of the header; `Database` for the root.
    pub title: String,
    /// Level of the header.
    pub level: HeadingLevel,
    /// The heading statement, `None` for the root.
    pub statement: Option<StatementIndex>,
    /// Parent node; the root is its own parent.
    pub parent: NodeId,
    /// Child headers, in database order.
    pub children: Vec<NodeId>,
    /// Statements located directly under this header, in database order.
    pub content: Vec<StatementIndex>,
    /// Index of the first statement after the header and all its descendants.
    pub end: StatementIndex,
}

impl OutlineNode {
    fn new(title: String, level: HeadingLevel, statement: Option<StatementIndex>, parent: NodeId) -> Self {
        OutlineNode {
            title,
            level,
            statement,
            parent,
            children: Vec::new(),
            content: Vec::new(),
            end: 0,
        }
    }
}

/// Returns true if the statement is listed in the content of its header.
///
/// Plain comments directly followed by an assertion are the description of
/// that assertion, and are not listed on their own.
fn is_content(statements: &[StatementEntry], index: StatementIndex) -> bool {
    match &statements[index].statement {
        Statement::Comment(CommentKind::Normal) => !statements
            .get(index + 1)
            .is_some_and(|next| next.statement.is_assertion()),
        Statement::Constant(_)
        | Statement::Variable(_)
        | Statement::Floating(_)
        | Statement::Axiom(_)
        | Statement::Theorem(_) => true,
        _ => false,
    }
}

/// The header tree of a database.
#[derive(Debug, Clone)]
pub struct Outline {
    nodes: Vec<OutlineNode>,
}

/// Where a new statement should go, as the index of the statement it
/// should be inserted before.
pub type InsertionPoint = StatementIndex;

impl Outline {
    /// The root node.
    pub const ROOT: NodeId = 0;

    /// Builds the header tree of a list of statements.
    #[must_use]
    pub fn build(statements: &[StatementEntry]) -> Self {
        let mut nodes = vec![OutlineNode::new("Database".to_owned(), HeadingLevel::Database, None, 0)];
        let mut stack = vec![Self::ROOT];
        for (index, entry) in statements.iter().enumerate() {
            if let Statement::Heading(heading) = &entry.statement {
                while let Some(&top) = stack.last() {
                    if nodes[top].level < heading.level {
                        break;
                    }
                    nodes[top].end = index;
                    stack.pop();
                }
                let parent = stack.last().copied().unwrap_or(Self::ROOT);
                let id = nodes.len();
                nodes.push(OutlineNode::new(heading.title.clone(), heading.level, Some(index), parent));
                nodes[parent].children.push(id);
                stack.push(id);
            } else if is_content(statements, index) {
                let top = stack.last().copied().unwrap_or(Self::ROOT);
                nodes[top].content.push(index);
            }
        }
        for id in stack {
            nodes[id].end = statements.len();
        }
        Outline { nodes }
    }

    /// Accesses a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &OutlineNode {
        &self.nodes[id]
    }

    /// Finds the node designated by a header path.
    #[must_use]
    pub fn resolve(&self, path: &HeaderPath) -> Option<NodeId> {
        let mut id = Self::ROOT;
        for &index in &path.0 {
            id = *self.nodes[id].children.get(index.checked_sub(1)?)?;
        }
        Some(id)
    }

    /// The path of a node.
    #[must_use]
    pub fn path_of(&self, mut id: NodeId) -> HeaderPath {
        let mut indices = Vec::new();
        while id != Self::ROOT {
            let parent = self.nodes[id].parent;
            let position = self.nodes[parent].children.iter().position(|&c| c == id);
            indices.push(position.map_or(0, |p| p + 1));
            id = parent;
        }
        indices.reverse();
        HeaderPath(indices)
    }

    /// The innermost header containing a statement.
    #[must_use]
    pub fn header_of(&self, index: StatementIndex) -> NodeId {
        let mut id = Self::ROOT;
        'descend: loop {
            for &child in &self.nodes[id].children {
                let child_node = &self.nodes[child];
                if child_node.statement.is_some_and(|s| s <= index) && index < child_node.end {
                    id = child;
                    continue 'descend;
                }
            }
            return id;
        }
    }

    /// The comments listed in a header, in order.
    pub fn comments<'a>(
        &'a self,
        statements: &'a [StatementEntry],
        id: NodeId,
    ) -> impl Iterator<Item = StatementIndex> + 'a {
        self.nodes[id]
            .content
            .iter()
            .copied()
            .filter(|&i| matches!(statements[i].statement, Statement::Comment(_)))
    }

    /// Finds where a new header with the given path would be inserted.
    ///
    /// The parent must exist, and the new header can be at most one past the
    /// existing children: header paths are dense.
    pub fn new_header_position(&self, path: &HeaderPath) -> Result<(InsertionPoint, HeadingLevel), Diagnostic> {
        let invalid = || Diagnostic::InvalidHeaderPath(path.to_string().into());
        if path.depth() > MAX_HEADER_DEPTH {
            return Err(invalid());
        }
        let (parent_path, index) = path.split_last().ok_or_else(invalid)?;
        let level = HeadingLevel::from_depth(path.depth()).ok_or_else(invalid)?;
        let parent = self.resolve(&parent_path).ok_or_else(invalid)?;
        let siblings = &self.nodes[parent].children;
        if index == 0 || index > siblings.len() + 1 {
            return Err(invalid());
        }
        let point = match siblings.get(index - 1) {
            Some(&sibling) => self.nodes[sibling].statement.unwrap_or(0),
            None => self.nodes[parent].end,
        };
        Ok((point, level))
    }

    /// Finds where a new comment with the given path would be inserted.
    ///
    /// The header must exist, and the index can be at most one past the
    /// number of comments already in it.
    pub fn new_comment_position(
        &self,
        statements: &[StatementEntry],
        path: &CommentPath,
    ) -> Result<InsertionPoint, Diagnostic> {
        let invalid = || Diagnostic::InvalidCommentPath(path.to_string().into());
        let id = self.resolve(&path.header).ok_or_else(invalid)?;
        let comments = self.comments(statements, id).collect::<Vec<_>>();
        if path.index > comments.len() + 1 {
            return Err(invalid());
        }
        let node = &self.nodes[id];
        Ok(match comments.get(path.index - 1) {
            Some(&comment) => comment,
            None => match node.children.first() {
                Some(&child) => self.nodes[child].statement.unwrap_or(node.end),
                None => node.end,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_paths() {
        assert_eq!("3.1.2".parse::<HeaderPath>().unwrap(), HeaderPath(vec![3, 1, 2]));
        assert_matches!("1.2.3.4.5".parse::<HeaderPath>(), Err(Diagnostic::InvalidHeaderPathFormat));
        assert_matches!("1..2".parse::<HeaderPath>(), Err(Diagnostic::InvalidHeaderPathFormat));
        assert_matches!("0.1".parse::<HeaderPath>(), Err(Diagnostic::InvalidHeaderPathFormat));
        let path = "2.1#3".parse::<CommentPath>().unwrap();
        assert_eq!(path.header, HeaderPath(vec![2, 1]));
        assert_eq!(path.index, 3);
        assert_eq!(path.to_string(), "2.1#3");
        assert_eq!("#1".parse::<CommentPath>().unwrap().header, HeaderPath::root());
        assert_matches!("2.1".parse::<CommentPath>(), Err(Diagnostic::InvalidCommentPathFormat));
        assert_matches!("2#x".parse::<CommentPath>(), Err(Diagnostic::InvalidCommentPathFormat));
    }
}

#![forbid(unsafe_code)]

//! NodeSet: the input to document-subset canonicalization.
//!
//! Every node of a document carries an inclusion flag. A whole-document set
//! starts with every flag on, a subset starts with every flag off, and the
//! listed nodes flip their flag. Attributes follow their owner element.
//!
//! Sets are built once and then only read: the builder methods consume the
//! set and return a new one.

use crate::document::{NodeId, XmlDocument};
use std::collections::HashSet;

/// A set of XML document nodes identified by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    /// Default inclusion flag for nodes not listed in `flipped`.
    default_included: bool,
    /// Nodes whose flag is the opposite of the default.
    flipped: HashSet<NodeId>,
    /// Whether comment nodes may be included at all.
    comments: bool,
}

impl NodeSet {
    /// Every node of the document, comments included.
    pub fn all() -> Self {
        Self {
            default_included: true,
            flipped: HashSet::new(),
            comments: true,
        }
    }

    /// Every node of the document except comments.
    pub fn all_without_comments() -> Self {
        Self::all().without_comments()
    }

    /// Exactly the listed nodes.
    pub fn subset(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            default_included: false,
            flipped: ids.into_iter().collect(),
            comments: true,
        }
    }

    /// `root` and all its descendants.
    pub fn tree(doc: &XmlDocument, root: NodeId) -> Self {
        Self::subset(doc.descendants(root))
    }

    /// `root` and all its descendants except comments.
    pub fn tree_without_comments(doc: &XmlDocument, root: NodeId) -> Self {
        Self::tree(doc, root).without_comments()
    }

    /// Include one more node.
    pub fn with(mut self, id: NodeId) -> Self {
        self.set(id, true);
        self
    }

    /// Exclude `root` and all its descendants.
    pub fn without_subtree(mut self, doc: &XmlDocument, root: NodeId) -> Self {
        for id in doc.descendants(root) {
            self.set(id, false);
        }
        self
    }

    /// Exclude every comment node.
    pub fn without_comments(mut self) -> Self {
        self.comments = false;
        self
    }

    fn set(&mut self, id: NodeId, included: bool) {
        if included == self.default_included {
            self.flipped.remove(&id);
        } else {
            self.flipped.insert(id);
        }
    }

    /// Whether `id` is in the set.
    pub fn contains(&self, doc: &XmlDocument, id: NodeId) -> bool {
        if !self.comments && doc.is_comment(id) {
            return false;
        }
        self.default_included != self.flipped.contains(&id)
    }

    /// Whether comment nodes can be part of this set.
    pub fn includes_comments(&self) -> bool {
        self.comments
    }
}

impl Default for NodeSet {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlDocument {
        XmlDocument::parse(r#"<r><a Id="a"><!--c--><b/></a><d/></r>"#).unwrap()
    }

    #[test]
    fn test_all_and_subset_defaults() {
        let doc = sample();
        let r = doc.document_element().unwrap();
        assert!(NodeSet::all().contains(&doc, r));
        assert!(!NodeSet::subset([]).contains(&doc, r));
        assert!(NodeSet::subset([r]).contains(&doc, r));
    }

    #[test]
    fn test_tree_without_comments() {
        let doc = sample();
        let a = doc.find_by_id("a").unwrap();
        let set = NodeSet::tree_without_comments(&doc, a);
        let comment = doc.children(a)[0];
        let b = doc.children(a)[1];
        assert!(set.contains(&doc, a));
        assert!(set.contains(&doc, b));
        assert!(!set.contains(&doc, comment));
        assert!(!set.contains(&doc, doc.document_element().unwrap()));
    }

    #[test]
    fn test_without_subtree_on_whole_document() {
        let doc = sample();
        let a = doc.find_by_id("a").unwrap();
        let set = NodeSet::all().without_subtree(&doc, a);
        let r = doc.document_element().unwrap();
        assert!(set.contains(&doc, r));
        assert!(!set.contains(&doc, a));
        assert!(!set.contains(&doc, doc.children(a)[1]));
        assert!(set.contains(&doc, doc.children(r)[1]));
    }
}

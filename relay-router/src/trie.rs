// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This implements the routing trie. The design goals are:
//!
//! * Byte granularity: every path byte is an edge, so that parameter continuations can be matched
//!   as automata
//! * Memory-efficient data storage after the setup phase, all nodes live in one vector and refer
//!   to each other by index
//! * Chains of single-child static nodes are compressed into byte runs compared in one go
//! * Nodes below a parameter carry Aho–Corasick failure links and their depth within the
//!   parameter automaton

use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::Range;

use crate::error::Error;
use crate::pattern::{Pattern, Token, SLASH};

/// Node type, determines which continuations a node may have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Plain node reached via a path byte
    Static,
    /// Root of a parameter automaton
    Param,
    /// Terminal capture of the path remainder
    Wildcard,
}

/// A compressed run of single-child static nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Part {
    /// Range within the labels vector
    pub(crate) label: Range<usize>,
    /// Node reached after the run
    pub(crate) target: usize,
}

/// A trie node
///
/// Static children of one node are stored consecutively and sorted by the byte leading to them.
/// Parameter and wildcard continuations are stored separately. `fail` and `depth` are only
/// meaningful for nodes within a parameter automaton, they point to the node itself and are zero
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) byte: u8,
    pub(crate) kind: NodeKind,
    pub(crate) children: Range<usize>,
    pub(crate) part: Option<Part>,
    pub(crate) param: Option<usize>,
    pub(crate) wildcard: Option<usize>,
    pub(crate) value: Option<usize>,
    pub(crate) fail: usize,
    pub(crate) depth: usize,
}

/// The built routing trie
///
/// Like the builder, this is generic over the value stored for endpoints. Values are kept in a
/// separate vector, nodes only store their index.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Trie<Value> {
    nodes: Vec<Node>,
    values: Vec<Value>,
    labels: Vec<u8>,
}

impl<Value> Trie<Value> {
    /// Index of the root node in the `nodes` vector, this is where matching always starts.
    pub(crate) const ROOT: usize = 0;

    /// Returns a builder instance that can be used to set up the trie.
    pub(crate) fn builder() -> TrieBuilder<Value> {
        TrieBuilder::new()
    }

    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub(crate) fn label(&self, range: Range<usize>) -> &[u8] {
        &self.labels[range]
    }

    /// Number of nodes, including those bypassed by compressed runs
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Indices of the static children of a node
    pub(crate) fn children(&self, index: usize) -> Range<usize> {
        self.nodes[index].children.clone()
    }

    /// Looks up the static child reached via the given byte.
    pub(crate) fn child(&self, index: usize, byte: u8) -> Option<usize> {
        let children = self.children(index);
        self.nodes[children.clone()]
            .binary_search_by_key(&byte, |node| node.byte)
            .ok()
            .map(|offset| children.start + offset)
    }

    /// Performs an automaton transition within the parameter automaton rooted at `root`,
    /// following failure links until a node with a matching child is found.
    pub(crate) fn step(&self, root: usize, mut state: usize, byte: u8) -> usize {
        loop {
            if let Some(child) = self.child(state, byte) {
                return child;
            }
            if state == root {
                return root;
            }
            state = self.nodes[state].fail;
        }
    }

    /// Lists all endpoints along with the tokens leading to them. Parameter tokens have empty
    /// names, the trie doesn’t know them.
    pub(crate) fn entries(&self) -> Vec<(Vec<Token>, &Value)> {
        let mut entries = Vec::new();
        self.collect(Self::ROOT, &mut Vec::new(), &mut entries);
        entries
    }

    fn collect<'a>(
        &'a self,
        index: usize,
        path: &mut Vec<Token>,
        entries: &mut Vec<(Vec<Token>, &'a Value)>,
    ) {
        let node = &self.nodes[index];
        if let Some(value) = node.value.and_then(|value| self.values.get(value)) {
            entries.push((path.clone(), value));
        }

        for child in node.children.clone() {
            path.push(Token::Byte(self.nodes[child].byte));
            self.collect(child, path, entries);
            path.pop();
        }

        for (continuation, token) in [
            (node.param, Token::Param(String::new())),
            (node.wildcard, Token::Wildcard),
        ] {
            if let Some(continuation) = continuation {
                path.push(token);
                self.collect(continuation, path, entries);
                path.pop();
            }
        }
    }

    /// Checks whether a static node can be folded into a compressed run.
    fn is_link(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        node.children.len() == 1
            && node.value.is_none()
            && node.param.is_none()
            && node.wildcard.is_none()
    }

    /// Compresses chains of single-child nodes outside of parameter automata.
    ///
    /// Nodes within a chain keep their children, the run is only a shortcut taken by the matchers.
    fn compress(&mut self) {
        let mut stack = vec![Self::ROOT];
        while let Some(index) = stack.pop() {
            if self.is_link(index) {
                let start = self.labels.len();
                let mut target = index;
                while self.is_link(target) {
                    let child = self.nodes[target].children.start;
                    self.labels.push(self.nodes[child].byte);
                    target = child;
                }
                self.nodes[index].part = Some(Part {
                    label: start..self.labels.len(),
                    target,
                });
                stack.push(target);
            } else {
                stack.extend(self.nodes[index].children.clone());
            }
        }
    }

    /// Sets up failure links and depths for every parameter automaton.
    fn link(&mut self) {
        for index in 0..self.nodes.len() {
            if self.nodes[index].kind == NodeKind::Param {
                self.link_automaton(index);
            }
        }
    }

    /// Breadth-first failure link construction for one parameter automaton. Nested parameters
    /// are roots of their own automata and aren’t visited here.
    fn link_automaton(&mut self, root: usize) {
        self.nodes[root].fail = root;
        self.nodes[root].depth = 0;

        let mut queue = VecDeque::from([root]);
        while let Some(parent) = queue.pop_front() {
            for child in self.nodes[parent].children.clone() {
                let fail = if parent == root {
                    root
                } else {
                    self.step(root, self.nodes[parent].fail, self.nodes[child].byte)
                };
                self.nodes[child].fail = fail;
                self.nodes[child].depth = self.nodes[parent].depth + 1;
                queue.push_back(child);
            }
        }
    }
}

impl<Value> Debug for Trie<Value>
where
    Value: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries()
                    .into_iter()
                    .map(|(tokens, value)| (crate::pattern::format(&tokens), value)),
            )
            .finish()
    }
}

/// A trie builder used to set up a `Trie` instance
#[derive(Debug)]
pub(crate) struct TrieBuilder<Value> {
    root: BuilderNode<Value>,
}

/// A builder node
///
/// Unlike `Node` this data structure owns its children and value directly.
#[derive(Debug)]
struct BuilderNode<Value> {
    kind: NodeKind,
    children: Vec<(u8, BuilderNode<Value>)>,
    param: Option<Box<BuilderNode<Value>>>,
    wildcard: Option<Box<BuilderNode<Value>>>,
    value: Option<Value>,
}

impl<Value> BuilderNode<Value> {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            param: None,
            wildcard: None,
            value: None,
        }
    }

    /// Returns the static child for the byte, creating it if necessary.
    fn child(&mut self, byte: u8) -> Result<&mut Self, Error> {
        if self.kind == NodeKind::Wildcard {
            return Err(Error::Unsupported("continuation after wildcard"));
        }

        let index = match self.children.iter().position(|(b, _)| *b == byte) {
            Some(index) => index,
            None => {
                self.children.push((byte, Self::new(NodeKind::Static)));
                self.children.len() - 1
            }
        };
        Ok(&mut self.children[index].1)
    }

    /// Returns the parameter continuation, creating it if necessary.
    fn param(&mut self) -> Result<&mut Self, Error> {
        if self.kind != NodeKind::Static {
            return Err(Error::Unsupported("parameter directly after parameter or wildcard"));
        }
        Ok(&mut **self
            .param
            .get_or_insert_with(|| Box::new(Self::new(NodeKind::Param))))
    }

    /// Returns the wildcard continuation, creating it if necessary.
    fn wildcard(&mut self) -> Result<&mut Self, Error> {
        if self.kind != NodeKind::Static {
            return Err(Error::Unsupported("wildcard directly after parameter or wildcard"));
        }
        Ok(&mut **self
            .wildcard
            .get_or_insert_with(|| Box::new(Self::new(NodeKind::Wildcard))))
    }

    /// Removes all branches without endpoints. Returns `true` if anything is left.
    fn clean(&mut self) -> bool {
        self.children.retain_mut(|(_, child)| child.clean());
        if self.param.as_mut().is_some_and(|param| !param.clean()) {
            self.param = None;
        }
        if self
            .wildcard
            .as_mut()
            .is_some_and(|wildcard| !wildcard.clean())
        {
            self.wildcard = None;
        }

        self.value.is_some()
            || !self.children.is_empty()
            || self.param.is_some()
            || self.wildcard.is_some()
    }

    fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|(_, child)| child.count())
            .sum::<usize>()
            + self.param.as_ref().map_or(0, |param| param.count())
            + self.wildcard.as_ref().map_or(0, |wildcard| wildcard.count())
    }
}

impl<Value> TrieBuilder<Value> {
    /// Creates a new builder.
    fn new() -> Self {
        Self {
            root: BuilderNode::new(NodeKind::Static),
        }
    }

    /// Walks the pattern, creating nodes as necessary, and returns the value slot of the node
    /// where it terminates.
    pub(crate) fn insert(&mut self, pattern: &Pattern) -> Result<&mut Option<Value>, Error> {
        let mut current = &mut self.root;
        for token in &pattern.tokens {
            current = match token {
                Token::Byte(byte) => current.child(*byte)?,
                Token::Param(_) => current.param()?,
                Token::Wildcard => current.wildcard()?,
            };
        }
        Ok(&mut current.value)
    }

    /// Grafts another trie at the given location.
    ///
    /// The location always ends with a slash and must not contain any parameters. It must not
    /// have any endpoints yet, branches without endpoints are discarded.
    pub(crate) fn mount(&mut self, prefix: &str, other: TrieBuilder<Value>) -> Result<(), Error> {
        let mut location = prefix.to_owned();
        if !location.ends_with(char::from(SLASH)) {
            location.push(char::from(SLASH));
        }
        let pattern = Pattern::parse(&location)?;
        if !pattern.is_static() {
            return Err(Error::MountParameter(prefix.to_owned()));
        }

        let (last, path) = pattern.tokens.split_last().ok_or(Error::MountRoot)?;
        let mut parent = &mut self.root;
        for token in path {
            if let Token::Byte(byte) = token {
                parent = parent.child(*byte)?;
            }
        }

        let Token::Byte(last) = last else {
            return Err(Error::MountParameter(prefix.to_owned()));
        };
        let target = parent.child(*last)?;
        if target.clean() {
            return Err(Error::MountOccupied(prefix.to_owned()));
        }
        *target = other.root;
        Ok(())
    }

    /// Removes branches that don’t lead to any endpoints. The root always stays.
    pub(crate) fn clean(&mut self) {
        self.root.clean();
    }

    /// Pushes an empty entry into the nodes vector.
    ///
    /// This is used to allocate space for the node, so that child nodes are always stored
    /// consecutively. The values are adjusted by `into_trie_node` later.
    fn push_trie_node(nodes: &mut Vec<Node>, byte: u8) -> usize {
        let index = nodes.len();
        nodes.push(Node {
            byte,
            kind: NodeKind::Static,
            children: 0..0,
            part: None,
            param: None,
            wildcard: None,
            value: None,
            fail: index,
            depth: 0,
        });
        index
    }

    /// Sets up an entry in the nodes vector.
    ///
    /// This will transfer data from a builder node to the trie node identified via index. It will
    /// also recurse to make sure continuations of the current node are transferred as well.
    fn into_trie_node(
        current: BuilderNode<Value>,
        index: usize,
        nodes: &mut Vec<Node>,
        values: &mut Vec<Value>,
    ) {
        let BuilderNode {
            kind,
            mut children,
            param,
            wildcard,
            value,
        } = current;

        nodes[index].kind = kind;
        if let Some(value) = value {
            nodes[index].value = Some(values.len());
            values.push(value);
        }

        children.sort_by_key(|(byte, _)| *byte);
        let first = nodes.len();
        nodes[index].children = first..first + children.len();
        for (byte, _) in &children {
            Self::push_trie_node(nodes, *byte);
        }

        let param = param.map(|param| {
            let param_index = Self::push_trie_node(nodes, b':');
            nodes[index].param = Some(param_index);
            (param_index, param)
        });
        let wildcard = wildcard.map(|wildcard| {
            let wildcard_index = Self::push_trie_node(nodes, b'*');
            nodes[index].wildcard = Some(wildcard_index);
            (wildcard_index, wildcard)
        });

        for (offset, (_, child)) in children.into_iter().enumerate() {
            Self::into_trie_node(child, first + offset, nodes, values);
        }
        for (continuation_index, continuation) in param.into_iter().chain(wildcard) {
            Self::into_trie_node(*continuation, continuation_index, nodes, values);
        }
    }

    /// Cleans up the builder data and translates it into a `Trie` instance.
    pub(crate) fn build(mut self) -> Trie<Value> {
        self.clean();

        let mut nodes = Vec::with_capacity(self.root.count());
        let mut values = Vec::new();

        let index = Self::push_trie_node(&mut nodes, 0);
        Self::into_trie_node(self.root, index, &mut nodes, &mut values);
        values.shrink_to_fit();

        let mut trie = Trie {
            nodes,
            values,
            labels: Vec::new(),
        };
        trie.compress();
        trie.link();
        trie
    }
}

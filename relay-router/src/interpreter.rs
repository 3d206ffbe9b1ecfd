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

//! Tree-walking matcher
//!
//! Static nodes are walked recursively: endpoint at the path boundary first, then the static
//! child (or compressed run), then the parameter automaton, then the wildcard. Parameter
//! automata are walked through their failure links by [`Scan`].

use crate::scan::{Attempt, Scan, ScanAutomaton};
use crate::trie::Trie;

/// A successful match: index of the endpoint value and parameter spans in capture order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    pub(crate) value: usize,
    pub(crate) spans: Vec<(usize, usize)>,
}

/// A parameter automaton within the trie
struct TrieAutomaton<'a, Value> {
    trie: &'a Trie<Value>,
    root: usize,
}

impl<Value> ScanAutomaton for TrieAutomaton<'_, Value> {
    type State = usize;

    fn root(&self) -> usize {
        self.root
    }

    fn depth(&self, state: usize) -> usize {
        self.trie.node(state).depth
    }

    fn transition(&self, state: usize, byte: u8) -> usize {
        self.trie.step(self.root, state, byte)
    }

    fn first_output(&self, mut state: usize) -> Option<usize> {
        loop {
            if self.is_terminal(state) || self.is_dynamic(state) {
                return Some(state);
            }
            if state == self.root {
                return None;
            }
            state = self.trie.node(state).fail;
        }
    }

    fn next_output(&self, state: usize) -> Option<usize> {
        if state == self.root {
            None
        } else {
            self.first_output(self.trie.node(state).fail)
        }
    }

    fn is_terminal(&self, state: usize) -> bool {
        self.trie.node(state).value.is_some()
    }

    fn is_dynamic(&self, state: usize) -> bool {
        let node = self.trie.node(state);
        node.param.is_some() || node.wildcard.is_some()
    }
}

/// Matching state for one path
pub(crate) struct Interpreter<'a, Value, F> {
    trie: &'a Trie<Value>,
    path: &'a [u8],
    end: usize,
    slashes: bool,
    accept: F,
    spans: Vec<(usize, usize)>,
}

impl<'a, Value, F> Interpreter<'a, Value, F>
where
    F: FnMut(&Value) -> bool,
{
    /// Matches `path[start..end]` against the trie. `accept` decides whether an endpoint value
    /// satisfies the request, rejected endpoints are treated like missing ones.
    pub(crate) fn find(
        trie: &'a Trie<Value>,
        path: &'a [u8],
        start: usize,
        end: usize,
        slashes: bool,
        accept: F,
    ) -> Option<Match> {
        let mut interpreter = Self {
            trie,
            path,
            end,
            slashes,
            accept,
            spans: Vec::new(),
        };
        let value = interpreter.walk(Trie::<Value>::ROOT, start)?;
        Some(Match {
            value,
            spans: interpreter.spans,
        })
    }

    fn accepts(&mut self, index: usize) -> Option<usize> {
        let value = self.trie.node(index).value?;
        if (self.accept)(self.trie.value(value)?) {
            Some(value)
        } else {
            None
        }
    }

    fn walk(&mut self, index: usize, offset: usize) -> Option<usize> {
        let trie = self.trie;
        let node = trie.node(index);

        if let Some(part) = &node.part {
            let label = trie.label(part.label.clone());
            return if self.path[offset..self.end].starts_with(label) {
                self.walk(part.target, offset + label.len())
            } else {
                None
            };
        }

        if offset == self.end {
            if let Some(value) = self.accepts(index) {
                return Some(value);
            }
        } else if let Some(child) = trie.child(index, self.path[offset]) {
            if let Some(value) = self.walk(child, offset + 1) {
                return Some(value);
            }
        }

        if let Some(param) = node.param {
            if let Some(value) = self.scan(param, offset) {
                return Some(value);
            }
        }

        node.wildcard
            .and_then(|wildcard| self.capture(wildcard, offset))
    }

    fn capture(&mut self, wildcard: usize, offset: usize) -> Option<usize> {
        self.spans.push((offset, self.end));
        let value = self.accepts(wildcard);
        if value.is_none() {
            self.spans.pop();
        }
        value
    }

    fn scan(&mut self, param: usize, start: usize) -> Option<usize> {
        let automaton = TrieAutomaton {
            trie: self.trie,
            root: param,
        };
        let mut scan = Scan::new(&automaton, self.path, start, self.end, self.slashes);
        while let Some(attempt) = scan.next(&automaton, self.path) {
            let mark = self.spans.len();
            match attempt {
                Attempt::Complete { state, split } => {
                    self.spans.push((start, split));
                    if let Some(value) = self.accepts(state) {
                        return Some(value);
                    }
                }
                Attempt::Continue {
                    state,
                    split,
                    offset,
                } => {
                    self.spans.push((start, split));
                    let trie = self.trie;
                    let node = trie.node(state);
                    if let Some(value) = node.param.and_then(|param| self.scan(param, offset)) {
                        return Some(value);
                    }
                    if let Some(value) = node
                        .wildcard
                        .and_then(|wildcard| self.capture(wildcard, offset))
                    {
                        return Some(value);
                    }
                }
            }
            self.spans.truncate(mark);
        }
        None
    }
}

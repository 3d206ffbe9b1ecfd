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

//! Compiled matcher
//!
//! The trie is lowered into a flat program: compressed runs become literal comparisons, static
//! nodes become jump tables indexed by the next path byte and parameter automata become dense
//! transition tables over byte classes. Matching runs on an explicit backtracking stack and
//! tries alternatives in exactly the order the tree-walking matcher does.

use std::collections::HashMap;

use crate::interpreter::Match;
use crate::scan::{Attempt, Scan, ScanAutomaton};
use crate::trie::Trie;

const NONE: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    /// Compare a byte run, continue with `next` on success
    Literal {
        label: std::ops::Range<usize>,
        next: usize,
    },
    /// Static node: endpoint, jump table, parameter automaton, wildcard value
    Branch {
        value: Option<usize>,
        low: u8,
        jump: std::ops::Range<usize>,
        param: Option<usize>,
        wildcard: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    depth: usize,
    value: Option<usize>,
    param: Option<usize>,
    wildcard: Option<usize>,
    output: Option<usize>,
    next_output: Option<usize>,
}

/// Parameter automaton with states numbered breadth-first, state 0 is the root
#[derive(Debug, Clone, PartialEq, Eq)]
struct Automaton {
    classes: [u16; 256],
    stride: usize,
    delta: Vec<usize>,
    states: Vec<State>,
}

impl ScanAutomaton for Automaton {
    type State = usize;

    fn root(&self) -> usize {
        0
    }

    fn depth(&self, state: usize) -> usize {
        self.states[state].depth
    }

    fn transition(&self, state: usize, byte: u8) -> usize {
        self.delta[state * self.stride + usize::from(self.classes[usize::from(byte)])]
    }

    fn first_output(&self, state: usize) -> Option<usize> {
        self.states[state].output
    }

    fn next_output(&self, state: usize) -> Option<usize> {
        self.states[state].next_output
    }

    fn is_terminal(&self, state: usize) -> bool {
        self.states[state].value.is_some()
    }

    fn is_dynamic(&self, state: usize) -> bool {
        let state = &self.states[state];
        state.param.is_some() || state.wildcard.is_some()
    }
}

/// A trie compiled for matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Program {
    instructions: Vec<Instruction>,
    labels: Vec<u8>,
    jumps: Vec<usize>,
    automata: Vec<Automaton>,
    start: usize,
}

impl Program {
    /// Compiles a built trie. Endpoint values are referred to by their index in the trie.
    pub(crate) fn compile<Value>(trie: &Trie<Value>) -> Self {
        let mut program = Self {
            instructions: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            automata: Vec::new(),
            start: 0,
        };
        program.start = program.compile_node(trie, Trie::<Value>::ROOT);
        program
    }

    /// Number of instructions and automaton states
    pub(crate) fn size(&self) -> (usize, usize) {
        (
            self.instructions.len(),
            self.automata.iter().map(|a| a.states.len()).sum(),
        )
    }

    fn compile_node<Value>(&mut self, trie: &Trie<Value>, index: usize) -> usize {
        let node = trie.node(index);
        let instruction = if let Some(part) = &node.part {
            let next = self.compile_node(trie, part.target);
            let start = self.labels.len();
            self.labels.extend_from_slice(trie.label(part.label.clone()));
            Instruction::Literal {
                label: start..self.labels.len(),
                next,
            }
        } else {
            let children = trie.children(index);
            let targets = children
                .clone()
                .map(|child| (trie.node(child).byte, self.compile_node(trie, child)))
                .collect::<Vec<_>>();
            let low = targets.first().map_or(0, |(byte, _)| *byte);
            let high = targets.last().map_or(0, |(byte, _)| *byte);
            let start = self.jumps.len();
            if !targets.is_empty() {
                self.jumps
                    .resize(start + usize::from(high - low) + 1, NONE);
                for (byte, target) in targets {
                    self.jumps[start + usize::from(byte - low)] = target;
                }
            }
            Instruction::Branch {
                value: node.value,
                low,
                jump: start..self.jumps.len(),
                param: node.param.map(|param| self.compile_automaton(trie, param)),
                wildcard: node.wildcard.and_then(|wildcard| trie.node(wildcard).value),
            }
        };
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn compile_automaton<Value>(&mut self, trie: &Trie<Value>, root: usize) -> usize {
        // Breadth-first numbering, failure links always point to lower numbers
        let mut order = vec![root];
        let mut position = 0;
        while position < order.len() {
            order.extend(trie.children(order[position]));
            position += 1;
        }
        let numbers = order
            .iter()
            .enumerate()
            .map(|(state, index)| (*index, state))
            .collect::<HashMap<_, _>>();
        let number = |index: usize| numbers.get(&index).copied().unwrap_or(0);

        let mut classes = [0u16; 256];
        let mut bytes = Vec::new();
        let mut stride = 1;
        for index in &order[1..] {
            let byte = trie.node(*index).byte;
            if classes[usize::from(byte)] == 0 {
                classes[usize::from(byte)] = stride as u16;
                bytes.push(byte);
                stride += 1;
            }
        }

        let mut delta = vec![0; order.len() * stride];
        let mut states: Vec<State> = Vec::with_capacity(order.len());
        for (state, index) in order.iter().enumerate() {
            for byte in &bytes {
                let target = trie.step(root, *index, *byte);
                delta[state * stride + usize::from(classes[usize::from(*byte)])] = number(target);
            }

            let node = trie.node(*index);
            let param = node.param.map(|param| self.compile_automaton(trie, param));
            let wildcard = node.wildcard.and_then(|wildcard| trie.node(wildcard).value);
            let interesting = node.value.is_some() || param.is_some() || wildcard.is_some();
            let next_output = if state == 0 {
                None
            } else {
                states[number(node.fail)].output
            };
            states.push(State {
                depth: node.depth,
                value: node.value,
                param,
                wildcard,
                output: if interesting { Some(state) } else { next_output },
                next_output,
            });
        }

        self.automata.push(Automaton {
            classes,
            stride,
            delta,
            states,
        });
        self.automata.len() - 1
    }

    fn jump(&self, low: u8, jump: &std::ops::Range<usize>, byte: u8) -> Option<usize> {
        let slot = usize::from(byte.checked_sub(low)?);
        if slot < jump.len() {
            Some(self.jumps[jump.start + slot]).filter(|target| *target != NONE)
        } else {
            None
        }
    }

    /// Matches `path[start..end]`, `accept` is called with the index of candidate endpoint
    /// values.
    pub(crate) fn find(
        &self,
        path: &[u8],
        start: usize,
        end: usize,
        slashes: bool,
        mut accept: impl FnMut(usize) -> bool,
    ) -> Option<Match> {
        let mut spans = Vec::new();
        let mut stack = Vec::new();
        let mut step = Step::Enter(self.start, start);

        loop {
            step = match step {
                Step::Enter(instruction, offset) => match &self.instructions[instruction] {
                    Instruction::Literal { label, next } => {
                        let label = &self.labels[label.clone()];
                        if path[offset..end].starts_with(label) {
                            Step::Enter(*next, offset + label.len())
                        } else {
                            Step::Resume
                        }
                    }
                    Instruction::Branch {
                        value,
                        low,
                        jump,
                        param,
                        wildcard,
                    } => {
                        if offset == end {
                            if let Some(value) = value.filter(|value| accept(*value)) {
                                return Some(Match { value, spans });
                            }
                        }
                        stack.push(Frame::Branch {
                            offset,
                            mark: spans.len(),
                            param: *param,
                            wildcard: *wildcard,
                        });
                        match path[offset..end]
                            .first()
                            .and_then(|byte| self.jump(*low, jump, *byte))
                        {
                            Some(child) => Step::Enter(child, offset + 1),
                            None => Step::Resume,
                        }
                    }
                },
                Step::Scan(automaton, offset) => {
                    let scan = Scan::new(&self.automata[automaton], path, offset, end, slashes);
                    stack.push(Frame::Scan {
                        automaton,
                        scan,
                        pending: None,
                        mark: spans.len(),
                    });
                    Step::Resume
                }
                Step::Resume => {
                    let frame = stack.last_mut()?;
                    let (next, done) = match frame {
                        Frame::Branch {
                            offset,
                            mark,
                            param,
                            wildcard,
                        } => {
                            spans.truncate(*mark);
                            if let Some(automaton) = param.take() {
                                (Step::Scan(automaton, *offset), false)
                            } else if let Some(wildcard) = wildcard.take() {
                                spans.push((*offset, end));
                                if accept(wildcard) {
                                    return Some(Match {
                                        value: wildcard,
                                        spans,
                                    });
                                }
                                spans.pop();
                                (Step::Resume, true)
                            } else {
                                (Step::Resume, true)
                            }
                        }
                        Frame::Scan {
                            automaton,
                            scan,
                            pending,
                            mark,
                        } => {
                            let automaton = &self.automata[*automaton];
                            if let Some((wildcard, offset)) = pending.take() {
                                spans.truncate(*mark + 1);
                                spans.push((offset, end));
                                if accept(wildcard) {
                                    return Some(Match {
                                        value: wildcard,
                                        spans,
                                    });
                                }
                            }
                            spans.truncate(*mark);

                            match scan.next(automaton, path) {
                                None => (Step::Resume, true),
                                Some(Attempt::Complete { state, split }) => {
                                    spans.push((scan.start(), split));
                                    if let Some(value) = automaton.states[state]
                                        .value
                                        .filter(|value| accept(*value))
                                    {
                                        return Some(Match { value, spans });
                                    }
                                    (Step::Resume, false)
                                }
                                Some(Attempt::Continue {
                                    state,
                                    split,
                                    offset,
                                }) => {
                                    spans.push((scan.start(), split));
                                    let state = &automaton.states[state];
                                    *pending = state.wildcard.map(|wildcard| (wildcard, offset));
                                    match state.param {
                                        Some(nested) => (Step::Scan(nested, offset), false),
                                        None => (Step::Resume, false),
                                    }
                                }
                            }
                        }
                    };
                    if done {
                        stack.pop();
                    }
                    next
                }
            };
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Enter(usize, usize),
    Scan(usize, usize),
    Resume,
}

#[derive(Debug)]
enum Frame {
    Branch {
        offset: usize,
        mark: usize,
        param: Option<usize>,
        wildcard: Option<usize>,
    },
    Scan {
        automaton: usize,
        scan: Scan<usize>,
        pending: Option<(usize, usize)>,
        mark: usize,
    },
}

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

//! Forward scan over a parameter automaton
//!
//! A parameter starting at offset `start` can end at any later offset `split`, its continuation
//! then has to match from `split` on. Rather than trying every split separately, the path bytes
//! are fed through the automaton once. The states on the failure chain of the current state are
//! exactly the splits whose static continuation still matches, so a continuation shared by
//! several candidate splits is never rescanned.
//!
//! Continuations leading into nested parameters or wildcards are deferred until every shorter
//! split has been settled. The scan therefore produces attempts in the same order as a naive
//! walk: shortest parameter value first, and for one value the deepest static continuation
//! first, endpoints before nested parameters before wildcards.

use std::collections::VecDeque;

use crate::pattern::SLASH;

/// Parameter automaton as seen by the scan
///
/// An output state is a state with an endpoint or a nested parameter or wildcard. Output states
/// on a failure chain are visited starting with the deepest one.
pub(crate) trait ScanAutomaton {
    /// State identifier
    type State: Copy;

    /// The initial state, corresponds to the parameter node itself
    fn root(&self) -> Self::State;

    /// Length of the static continuation leading to the state
    fn depth(&self, state: Self::State) -> usize;

    /// Transition on a byte, failure links resolved
    fn transition(&self, state: Self::State, byte: u8) -> Self::State;

    /// The state itself if it is an output state, otherwise the first output state on its
    /// failure chain
    fn first_output(&self, state: Self::State) -> Option<Self::State>;

    /// The next output state on the failure chain of an output state
    fn next_output(&self, state: Self::State) -> Option<Self::State>;

    /// Whether the state has an endpoint
    fn is_terminal(&self, state: Self::State) -> bool;

    /// Whether the state has a nested parameter or wildcard
    fn is_dynamic(&self, state: Self::State) -> bool;
}

/// Something the matcher should try next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt<S> {
    /// Path ends in `state`, parameter value ends at `split`
    Complete { state: S, split: usize },
    /// Nested parameter or wildcard of `state` starting at `offset`, parameter value ends at
    /// `split`
    Continue { state: S, split: usize, offset: usize },
}

#[derive(Debug, Clone, Copy)]
struct Deferred<S> {
    state: S,
    split: usize,
    offset: usize,
}

impl<S> Deferred<S> {
    fn attempt(self) -> Attempt<S> {
        Attempt::Continue {
            state: self.state,
            split: self.split,
            offset: self.offset,
        }
    }
}

/// Incremental scan state for one parameter
#[derive(Debug)]
pub(crate) struct Scan<S> {
    start: usize,
    end: usize,
    slashes: bool,
    offset: usize,
    state: S,
    /// Position of the first slash consumed, splits beyond it are invalid
    limit: usize,
    deferred: Vec<Deferred<S>>,
    ready: VecDeque<Attempt<S>>,
    finished: bool,
}

impl<S: Copy> Scan<S> {
    /// Starts scanning a parameter at `start`, the path is considered to end at `end`.
    ///
    /// Unless `slashes` is set, parameter values cannot contain slashes.
    pub(crate) fn new<A>(automaton: &A, path: &[u8], start: usize, end: usize, slashes: bool) -> Self
    where
        A: ScanAutomaton<State = S>,
    {
        let mut scan = Self {
            start,
            end,
            slashes,
            offset: start + 1,
            state: automaton.root(),
            limit: usize::MAX,
            deferred: Vec::new(),
            ready: VecDeque::new(),
            finished: start >= end || (!slashes && path[start] == SLASH),
        };
        if !scan.finished {
            scan.arrive(automaton);
        }
        scan
    }

    /// Offset where the parameter value starts
    pub(crate) fn start(&self) -> usize {
        self.start
    }

    /// Produces the next attempt, `None` once all candidates are exhausted.
    pub(crate) fn next<A>(&mut self, automaton: &A, path: &[u8]) -> Option<Attempt<S>>
    where
        A: ScanAutomaton<State = S>,
    {
        loop {
            if let Some(attempt) = self.ready.pop_front() {
                return Some(attempt);
            }
            if self.finished {
                return None;
            }
            self.advance(automaton, path);
        }
    }

    fn advance<A>(&mut self, automaton: &A, path: &[u8])
    where
        A: ScanAutomaton<State = S>,
    {
        // The deepest state corresponds to the shortest split still alive
        let shortest = self.offset - automaton.depth(self.state);
        let alive = shortest <= self.limit;
        self.release(if alive { shortest } else { usize::MAX });

        if self.offset == self.end {
            if alive {
                self.finish(automaton);
            }
            self.finished = true;
        } else if !alive {
            self.finished = true;
        } else {
            let byte = path[self.offset];
            if byte == SLASH && !self.slashes && self.limit == usize::MAX {
                self.limit = self.offset;
            }
            self.state = automaton.transition(self.state, byte);
            self.offset += 1;
            self.arrive(automaton);
        }
    }

    /// Records nested continuations available at the current offset.
    fn arrive<A>(&mut self, automaton: &A)
    where
        A: ScanAutomaton<State = S>,
    {
        let mut output = automaton.first_output(self.state);
        while let Some(state) = output {
            let split = self.offset - automaton.depth(state);
            if split > self.limit {
                break;
            }
            if automaton.is_dynamic(state) {
                self.deferred.push(Deferred {
                    state,
                    split,
                    offset: self.offset,
                });
            }
            output = automaton.next_output(state);
        }
    }

    /// Moves deferred continuations of splits below `bound` into the ready queue.
    fn release(&mut self, bound: usize) {
        let mut settled = Vec::new();
        self.deferred.retain(|deferred| {
            if deferred.split < bound {
                settled.push(*deferred);
                false
            } else {
                true
            }
        });
        Self::order(&mut settled);
        self.ready
            .extend(settled.into_iter().map(Deferred::attempt));
    }

    /// Merges endpoints reached at the end of the path with all remaining deferred
    /// continuations.
    fn finish<A>(&mut self, automaton: &A)
    where
        A: ScanAutomaton<State = S>,
    {
        let mut deferred = std::mem::take(&mut self.deferred);
        Self::order(&mut deferred);
        let mut deferred = deferred.into_iter().peekable();

        let mut output = automaton.first_output(self.state);
        while let Some(state) = output {
            let split = self.offset - automaton.depth(state);
            if split > self.limit {
                break;
            }
            if automaton.is_terminal(state) {
                while let Some(earlier) = deferred.next_if(|d| d.split < split) {
                    self.ready.push_back(earlier.attempt());
                }
                self.ready.push_back(Attempt::Complete { state, split });
                while let Some(same) = deferred.next_if(|d| d.split == split) {
                    self.ready.push_back(same.attempt());
                }
            }
            output = automaton.next_output(state);
        }
        self.ready.extend(deferred.map(Deferred::attempt));
    }

    /// Shortest split first, deepest continuation first for the same split
    fn order(deferred: &mut [Deferred<S>]) {
        deferred.sort_by(|a, b| a.split.cmp(&b.split).then(b.offset.cmp(&a.offset)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    /// Automaton over a single continuation without repeated bytes, so that every failure link
    /// points to the root
    struct Line {
        continuation: &'static [u8],
        dynamic: usize,
    }

    impl ScanAutomaton for Line {
        type State = usize;

        fn root(&self) -> usize {
            0
        }

        fn depth(&self, state: usize) -> usize {
            state
        }

        fn transition(&self, state: usize, byte: u8) -> usize {
            if self.continuation.get(state) == Some(&byte) {
                state + 1
            } else if self.continuation.first() == Some(&byte) {
                1
            } else {
                0
            }
        }

        fn first_output(&self, state: usize) -> Option<usize> {
            if self.is_terminal(state) || self.is_dynamic(state) {
                Some(state)
            } else {
                self.next_output(state)
            }
        }

        fn next_output(&self, state: usize) -> Option<usize> {
            (state != 0 && (self.is_terminal(0) || self.is_dynamic(0))).then_some(0)
        }

        fn is_terminal(&self, state: usize) -> bool {
            state == self.continuation.len()
        }

        fn is_dynamic(&self, state: usize) -> bool {
            state == self.dynamic
        }
    }

    fn attempts(automaton: &Line, path: &str, start: usize, slashes: bool) -> Vec<Attempt<usize>> {
        let path = path.as_bytes();
        let mut scan = Scan::new(automaton, path, start, path.len(), slashes);
        let mut result = Vec::new();
        while let Some(attempt) = scan.next(automaton, path) {
            result.push(attempt);
        }
        result
    }

    #[test]
    fn terminal_at_end() {
        let automaton = Line {
            continuation: b".json",
            dynamic: usize::MAX,
        };
        assert_eq!(
            attempts(&automaton, "/a.b.json", 1, false),
            vec![Attempt::Complete { state: 5, split: 4 }]
        );
        assert_eq!(attempts(&automaton, "/a.b.jso", 1, false), Vec::new());
    }

    #[test]
    fn slash_limit() {
        let automaton = Line {
            continuation: b"/x",
            dynamic: usize::MAX,
        };
        assert_eq!(
            attempts(&automaton, "/ab/x", 1, false),
            vec![Attempt::Complete { state: 2, split: 3 }]
        );
        // Continuation after a second slash would require the value to contain one
        assert_eq!(attempts(&automaton, "/a/b/x", 1, false), Vec::new());
        assert_eq!(
            attempts(&automaton, "/a/b/x", 1, true),
            vec![Attempt::Complete { state: 2, split: 4 }]
        );
        // Empty values aren’t allowed
        assert_eq!(attempts(&automaton, "//x", 1, false), Vec::new());
        assert_eq!(attempts(&automaton, "/", 1, false), Vec::new());
    }

    #[test]
    fn deferred_order() {
        // Continuation "-" leads into a nested dynamic branch, "-x" is an endpoint
        let automaton = Line {
            continuation: b"-x",
            dynamic: 1,
        };
        assert_eq!(
            attempts(&automaton, "/a-b-x", 1, false),
            vec![
                Attempt::Continue {
                    state: 1,
                    split: 2,
                    offset: 3
                },
                Attempt::Complete { state: 2, split: 4 },
                Attempt::Continue {
                    state: 1,
                    split: 4,
                    offset: 5
                },
            ]
        );
    }

    #[test]
    fn root_value_runs_to_end() {
        let automaton = Line {
            continuation: b"",
            dynamic: usize::MAX,
        };
        assert_eq!(
            attempts(&automaton, "/abc", 1, false),
            vec![Attempt::Complete { state: 0, split: 4 }]
        );
        assert_eq!(attempts(&automaton, "/abc/", 1, false), Vec::new());
    }
}

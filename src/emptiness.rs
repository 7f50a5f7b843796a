//! Nested depth-first search for accepting cycles.
//!
//! The product of the Kripke structure with the Büchi automaton of the
//! negated property has an accepting run iff the property is violated. The
//! classic two-color nested DFS finds one: the blue search explores the
//! product in depth-first order and, in postorder at every accepting state,
//! seeds a red search for a cycle back onto the blue stack. Hitting any
//! state still on the blue stack closes a lasso through the accepting seed.
//!
//! Product states pair a canonical pooled Kripke state with a Büchi state
//! index. Canonicalization goes through a [`StateTable`], which owns one
//! reference per distinct configuration; everything is dropped when the
//! search ends.

use std::collections::HashMap;

use log::{debug, info};

use crate::bdd::Bdd;
use crate::buchi::Buchi;
use crate::error::Result;
use crate::kripke::Kripke;
use crate::reference::Ref;
use crate::state::{StateId, StateTable};

/// One step of a run: a state together with the condition labeling its
/// outgoing edges at that point.
#[derive(Debug, Copy, Clone)]
pub struct Step {
    pub state: StateId,
    pub cond: Ref,
}

/// Lasso-shaped counterexample: `prefix` leads from the initial state to
/// the cycle, `cycle` repeats forever. The states stay valid until the
/// Kripke adapter is torn down.
pub struct Run {
    pub prefix: Vec<Step>,
    pub cycle: Vec<Step>,
}

type Product = (StateId, usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Color {
    /// On the blue DFS stack.
    Cyan,
    /// Blue DFS finished.
    Blue,
    /// Visited by some red search; cannot lie on an accepting cycle.
    Red,
}

struct Frame {
    st: Product,
    succ: Vec<Product>,
    idx: usize,
}

struct Search<'a, 'b> {
    kripke: &'a mut Kripke<'b>,
    buchi: &'a Buchi,
    bdd: &'a Bdd,
    table: StateTable,
    colors: HashMap<Product, Color>,
    expansions: usize,
}

/// Search the product for an accepting run. `None` means the product is
/// empty and the checked property holds.
pub fn find_accepting_run(
    kripke: &mut Kripke<'_>,
    buchi: &Buchi,
    bdd: &Bdd,
) -> Result<Option<Run>> {
    let mut search = Search {
        kripke,
        buchi,
        bdd,
        table: StateTable::new(),
        colors: HashMap::new(),
        expansions: 0,
    };
    let result = search.run();
    debug!(
        "explored {} product state(s) over {} expansion(s)",
        search.colors.len(),
        search.expansions
    );
    // Give the counterexample its own references before the table lets go
    // of the search's states. They live until the adapter is torn down.
    if let Ok(Some(run)) = &result {
        for step in run.prefix.iter().chain(&run.cycle) {
            search.kripke.retain(step.state);
        }
    }
    search.table.clear(search.kripke.pool_mut());
    result
}

impl Search<'_, '_> {
    fn run(&mut self) -> Result<Option<Run>> {
        let init = self.kripke.init_state()?;
        let init = self.table.canonicalize(self.kripke.pool_mut(), init);

        // The automaton reads the letter of the initial state when it
        // enters its initial states.
        let letter = self.letter(init);
        let roots: Vec<Product> = self
            .buchi
            .initial
            .iter()
            .copied()
            .filter(|&q| !self.bdd.is_zero(self.bdd.apply_and(letter, self.buchi.states[q].guard)))
            .map(|q| (init, q))
            .collect();

        for root in roots {
            if self.colors.contains_key(&root) {
                continue;
            }
            if let Some(run) = self.dfs_blue(root) {
                info!(
                    "accepting run found: {} prefix + {} cycle state(s)",
                    run.prefix.len(),
                    run.cycle.len()
                );
                return Ok(Some(run));
            }
        }
        Ok(None)
    }

    /// The condition all edges out of `s` carry.
    fn letter(&mut self, s: StateId) -> Ref {
        let it = self.kripke.succ_iter(s);
        let cond = it.cond();
        self.kripke.recycle(it);
        cond
    }

    fn step(&mut self, s: StateId) -> Step {
        Step {
            state: s,
            cond: self.letter(s),
        }
    }

    /// Product successors of `(s, q)`: every Kripke successor `s2` of `s`
    /// paired with every Büchi successor `q2` of `q` whose guard is
    /// compatible with the letter of `s2`. Guards read the letter at their
    /// own position, matching the root filter on the initial state.
    fn succs(&mut self, (s, q): Product) -> Vec<Product> {
        self.expansions += 1;
        let mut it = self.kripke.succ_iter(s);

        let mut batch = Vec::new();
        if it.first() {
            loop {
                let fresh = self.kripke.retain(it.current());
                batch.push(self.table.canonicalize(self.kripke.pool_mut(), fresh));
                if !it.next() {
                    break;
                }
            }
        }
        self.kripke.recycle(it);

        let mut out = Vec::new();
        for &s2 in &batch {
            let letter = self.letter(s2);
            for &q2 in &self.buchi.states[q].succ {
                let guard = self.buchi.states[q2].guard;
                if !self.bdd.is_zero(self.bdd.apply_and(letter, guard)) {
                    out.push((s2, q2));
                }
            }
        }
        out
    }

    fn accepting(&self, (_, q): Product) -> bool {
        self.buchi.states[q].accepting
    }

    fn dfs_blue(&mut self, root: Product) -> Option<Run> {
        let mut stack: Vec<Frame> = Vec::new();
        self.colors.insert(root, Color::Cyan);
        let succ = self.succs(root);
        stack.push(Frame { st: root, succ, idx: 0 });

        while let Some(top) = stack.last_mut() {
            if top.idx < top.succ.len() {
                let u = top.succ[top.idx];
                top.idx += 1;
                if !self.colors.contains_key(&u) {
                    self.colors.insert(u, Color::Cyan);
                    let succ = self.succs(u);
                    stack.push(Frame { st: u, succ, idx: 0 });
                }
                continue;
            }

            // Postorder: seed a red search at accepting states.
            let t = top.st;
            if self.accepting(t) {
                if let Some(red_path) = self.dfs_red(t) {
                    return Some(self.extract(&stack, &red_path));
                }
            }
            self.colors.insert(t, Color::Blue);
            stack.pop();
        }
        None
    }

    /// Red search from the accepting seed. Returns a path `seed .. cyan`
    /// if some state on the blue stack is reachable, closing a cycle.
    fn dfs_red(&mut self, seed: Product) -> Option<Vec<Product>> {
        let mut stack: Vec<Frame> = Vec::new();
        let succ = self.succs(seed);
        stack.push(Frame { st: seed, succ, idx: 0 });

        while let Some(top) = stack.last_mut() {
            if top.idx < top.succ.len() {
                let u = top.succ[top.idx];
                top.idx += 1;
                match self.colors.get(&u) {
                    Some(Color::Cyan) => {
                        let mut path: Vec<Product> = stack.iter().map(|f| f.st).collect();
                        path.push(u);
                        return Some(path);
                    }
                    Some(Color::Blue) => {
                        self.colors.insert(u, Color::Red);
                        let succ = self.succs(u);
                        stack.push(Frame { st: u, succ, idx: 0 });
                    }
                    // Red states cannot close a cycle; unvisited states are
                    // impossible since the seed is expanded in postorder.
                    _ => {}
                }
            } else {
                stack.pop();
            }
        }
        None
    }

    /// Stitch the lasso together: the blue stack from the root to the cyan
    /// state starts the prefix, the rest of the blue stack plus the red
    /// path forms the cycle.
    fn extract(&mut self, blue: &[Frame], red_path: &[Product]) -> Run {
        let entry = *red_path.last().expect("red path ends on the cyan state");
        let pos = blue
            .iter()
            .position(|f| f.st == entry)
            .expect("cyan state is on the blue stack");

        let prefix = blue[..pos].iter().map(|f| f.st.0).collect::<Vec<_>>();
        let mut cycle: Vec<StateId> = blue[pos..].iter().map(|f| f.st.0).collect();
        // Red path: seed (already on the blue stack) .. cyan (the entry).
        for &(s, _) in &red_path[1..red_path.len() - 1] {
            cycle.push(s);
        }
        Run {
            prefix: prefix.into_iter().map(|s| self.step(s)).collect(),
            cycle: cycle.into_iter().map(|s| self.step(s)).collect(),
        }
    }
}

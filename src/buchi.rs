//! Translating LTL formulas to Büchi automata.
//!
//! The tableau construction of Gerth, Peled, Vardi and Wolper builds a
//! generalized Büchi automaton whose nodes are labeled with sets of
//! subformulas. Labels are state-based: a run `r0 r1 ...` over a word
//! `x0 x1 ...` requires `xi` to satisfy the guard of `ri`. The guard of a
//! node is the cube of the literals it carries, over the proposition
//! variables of the dictionary.
//!
//! One acceptance set per `U` subformula; the generalized automaton is
//! degeneralized with a counter so the emptiness check only has to find a
//! cycle through one accepting flag. The counter advances through the
//! acceptance sets as the run passes them; a state is accepting when the
//! counter has cleared all of them, and the count restarts there.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::bdd::Bdd;
use crate::dict::VarDict;
use crate::ltl::Formula;
use crate::reference::Ref;

pub struct BuchiState {
    /// Condition the paired word letter must satisfy. Never `zero`.
    pub guard: Ref,
    pub accepting: bool,
    pub succ: Vec<usize>,
}

pub struct Buchi {
    pub states: Vec<BuchiState>,
    pub initial: Vec<usize>,
}

impl Buchi {
    pub fn len(&self) -> usize {
        self.states.len()
    }
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Marker for edges coming from the virtual initial node.
const INIT: usize = usize::MAX;

#[derive(Debug)]
struct Node {
    incoming: BTreeSet<usize>,
    new: BTreeSet<Formula>,
    old: BTreeSet<Formula>,
    next: BTreeSet<Formula>,
}

/// Translate `f` into a Büchi automaton over the variables of `dict`.
/// Every atom of `f` must already be registered.
pub fn translate(f: &Formula, bdd: &Bdd, dict: &VarDict) -> Buchi {
    let nnf = f.to_nnf();

    let mut nodes: Vec<Node> = Vec::new();
    let start = Node {
        incoming: [INIT].into(),
        new: [nnf.clone()].into(),
        old: BTreeSet::new(),
        next: BTreeSet::new(),
    };
    expand(start, &mut nodes);

    // Acceptance sets, one per Until subformula, in a fixed order.
    let untils: Vec<(Formula, Formula)> = {
        let mut set = BTreeSet::new();
        collect_untils(&nnf, &mut set);
        set.into_iter().collect()
    };
    let n = untils.len();

    // A node passes acceptance set `i` when it does not owe `untils[i]`
    // anything: the obligation is absent or already discharged.
    let passes = |old: &BTreeSet<Formula>, i: usize| -> bool {
        let (ref whole, ref rhs) = untils[i];
        !old.contains(whole) || old.contains(rhs)
    };
    let adv = |mut c: usize, old: &BTreeSet<Formula>| -> usize {
        while c < n && passes(old, c) {
            c += 1;
        }
        c
    };

    let guards: Vec<Ref> = nodes.iter().map(|nd| guard(&nd.old, bdd, dict)).collect();
    let node_succ: Vec<Vec<usize>> = (0..nodes.len())
        .map(|i| {
            (0..nodes.len())
                .filter(|&j| nodes[j].incoming.contains(&i))
                .collect()
        })
        .collect();

    // Counting degeneralization over the reachable (node, counter) pairs.
    let mut ids: HashMap<(usize, usize), usize> = HashMap::new();
    let mut states: Vec<BuchiState> = Vec::new();
    let mut initial = Vec::new();
    let mut todo = Vec::new();

    fn intern(
        node: usize,
        c: usize,
        n: usize,
        guards: &[Ref],
        ids: &mut HashMap<(usize, usize), usize>,
        states: &mut Vec<BuchiState>,
        todo: &mut Vec<(usize, usize)>,
    ) -> usize {
        *ids.entry((node, c)).or_insert_with(|| {
            let id = states.len();
            states.push(BuchiState {
                guard: guards[node],
                accepting: c == n,
                succ: Vec::new(),
            });
            todo.push((node, c));
            id
        })
    }

    for (i, nd) in nodes.iter().enumerate() {
        if nd.incoming.contains(&INIT) {
            let c = adv(0, &nd.old);
            let id = intern(i, c, n, &guards, &mut ids, &mut states, &mut todo);
            initial.push(id);
        }
    }

    while let Some((i, c)) = todo.pop() {
        let id = ids[&(i, c)];
        let base = if c == n { 0 } else { c };
        let mut succ = Vec::new();
        for &j in &node_succ[i] {
            let cj = adv(base, &nodes[j].old);
            succ.push(intern(j, cj, n, &guards, &mut ids, &mut states, &mut todo));
        }
        states[id].succ = succ;
    }

    debug!(
        "translated `{}`: {} tableau node(s), {} state(s), {} acceptance set(s)",
        f,
        nodes.len(),
        states.len(),
        n
    );
    Buchi { states, initial }
}

/// Tableau expansion. `node.new` holds the unprocessed obligations; once it
/// drains, the node is merged into the store and its `next` set seeds the
/// following node.
fn expand(mut node: Node, store: &mut Vec<Node>) {
    let Some(f) = node.new.iter().next().cloned() else {
        // Fully processed: merge with an equivalent node if one exists.
        if let Some(i) = store
            .iter()
            .position(|nd| nd.old == node.old && nd.next == node.next)
        {
            let incoming = node.incoming;
            store[i].incoming.extend(incoming);
            return;
        }
        let id = store.len();
        let next = node.next.clone();
        store.push(node);
        let follower = Node {
            incoming: [id].into(),
            new: next,
            old: BTreeSet::new(),
            next: BTreeSet::new(),
        };
        expand(follower, store);
        return;
    };
    node.new.remove(&f);

    match f {
        Formula::False => {} // contradiction, drop the node
        Formula::True => expand(node, store),
        Formula::Atom(_) => {
            if node.old.contains(&f.clone().not()) {
                return;
            }
            node.old.insert(f);
            expand(node, store);
        }
        Formula::Not(ref p) => {
            debug_assert!(matches!(**p, Formula::Atom(_)), "input is in NNF");
            if node.old.contains(&**p) {
                return;
            }
            node.old.insert(f);
            expand(node, store);
        }
        Formula::And(p, q) => {
            node.new.insert(*p);
            node.new.insert(*q);
            expand(node, store);
        }
        Formula::Or(p, q) => {
            let mut left = clone_node(&node);
            left.new.insert(*p);
            expand(left, store);
            node.new.insert(*q);
            expand(node, store);
        }
        Formula::Until(ref p, ref q) => {
            // p U q: either q now, or p now and p U q next.
            let mut now = clone_node(&node);
            now.old.insert(f.clone());
            now.new.insert((**q).clone());
            expand(now, store);

            node.old.insert(f.clone());
            node.new.insert((**p).clone());
            node.next.insert(f);
            expand(node, store);
        }
        Formula::Release(ref p, ref q) => {
            // p R q: either p and q now, or q now and p R q next.
            let mut now = clone_node(&node);
            now.old.insert(f.clone());
            now.new.insert((**p).clone());
            now.new.insert((**q).clone());
            expand(now, store);

            node.old.insert(f.clone());
            node.new.insert((**q).clone());
            node.next.insert(f);
            expand(node, store);
        }
        Formula::Next(p) => {
            node.next.insert(*p);
            expand(node, store);
        }
        Formula::Implies(..) | Formula::Finally(..) | Formula::Globally(..)
        | Formula::WeakUntil(..) => {
            unreachable!("rewritten away by NNF conversion")
        }
    }
}

fn clone_node(node: &Node) -> Node {
    Node {
        incoming: node.incoming.clone(),
        new: node.new.clone(),
        old: node.old.clone(),
        next: node.next.clone(),
    }
}

fn guard(old: &BTreeSet<Formula>, bdd: &Bdd, dict: &VarDict) -> Ref {
    let lit = |name: &str| -> i32 {
        let var = dict
            .var(name)
            .expect("formula atoms are registered before translation");
        var as i32
    };
    let mut literals = Vec::new();
    for f in old {
        match f {
            Formula::Atom(name) => literals.push(lit(name)),
            Formula::Not(p) => {
                if let Formula::Atom(name) = &**p {
                    literals.push(-lit(name));
                }
            }
            _ => {}
        }
    }
    bdd.cube(literals)
}

fn collect_untils(f: &Formula, out: &mut BTreeSet<(Formula, Formula)>) {
    match f {
        Formula::Until(p, q) => {
            out.insert((f.clone(), (**q).clone()));
            collect_untils(p, out);
            collect_untils(q, out);
        }
        Formula::Not(p) | Formula::Next(p) | Formula::Finally(p) | Formula::Globally(p) => {
            collect_untils(p, out)
        }
        Formula::And(p, q)
        | Formula::Or(p, q)
        | Formula::Implies(p, q)
        | Formula::Release(p, q)
        | Formula::WeakUntil(p, q) => {
            collect_untils(p, out);
            collect_untils(q, out);
        }
        Formula::Atom(_) | Formula::True | Formula::False => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use test_log::test;

    use super::*;

    /// Check whether the automaton accepts the ultimately periodic word
    /// `prefix cycle^w`, where each letter is a total assignment cube.
    fn accepts(bdd: &Bdd, aut: &Buchi, prefix: &[Ref], cycle: &[Ref]) -> bool {
        assert!(!cycle.is_empty());
        let total = prefix.len() + cycle.len();
        let letter = |pos: usize| {
            if pos < prefix.len() {
                prefix[pos]
            } else {
                cycle[pos - prefix.len()]
            }
        };
        let next_pos = |pos: usize| {
            if pos + 1 == total {
                prefix.len()
            } else {
                pos + 1
            }
        };
        let sat = |s: usize, pos: usize| !bdd.is_zero(bdd.apply_and(aut.states[s].guard, letter(pos)));

        // Reachable (state, position) pairs.
        let mut seen = HashSet::new();
        let mut todo: Vec<(usize, usize)> = aut
            .initial
            .iter()
            .copied()
            .filter(|&s| sat(s, 0))
            .map(|s| (s, 0))
            .collect();
        while let Some((s, pos)) = todo.pop() {
            if !seen.insert((s, pos)) {
                continue;
            }
            for &t in &aut.states[s].succ {
                if sat(t, next_pos(pos)) {
                    todo.push((t, next_pos(pos)));
                }
            }
        }

        // An accepting pair in the periodic part must reach itself.
        for &(s, pos) in seen.iter() {
            if pos < prefix.len() || !aut.states[s].accepting {
                continue;
            }
            let mut reach = HashSet::new();
            let mut todo = vec![(s, pos)];
            while let Some((u, p)) = todo.pop() {
                for &t in &aut.states[u].succ {
                    let q = next_pos(p);
                    if sat(t, q) && reach.insert((t, q)) {
                        if (t, q) == (s, pos) {
                            return true;
                        }
                        todo.push((t, q));
                    }
                }
            }
        }
        false
    }

    fn setup(text: &str) -> (Bdd, VarDict, Buchi) {
        let f = Formula::parse(text).unwrap();
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        for atom in f.atoms() {
            dict.register(&atom);
        }
        let aut = translate(&f, &bdd, &dict);
        (bdd, dict, aut)
    }

    #[test]
    fn test_true_accepts_everything() {
        let (bdd, _, aut) = setup("true");
        assert!(!aut.initial.is_empty());
        assert!(accepts(&bdd, &aut, &[], &[bdd.one]));
    }

    #[test]
    fn test_false_has_no_initial_state() {
        let (_, _, aut) = setup("false");
        assert!(aut.initial.is_empty());
    }

    #[test]
    fn test_until() {
        let (bdd, dict, aut) = setup("a U b");
        let a = dict.var("a").unwrap() as i32;
        let b = dict.var("b").unwrap() as i32;
        let only_a = bdd.cube([a, -b]);
        let only_b = bdd.cube([-a, b]);
        let neither = bdd.cube([-a, -b]);

        // b immediately, then anything.
        assert!(accepts(&bdd, &aut, &[only_b], &[neither]));
        // a a a b, then anything.
        assert!(accepts(&bdd, &aut, &[only_a, only_a, only_a, only_b], &[neither]));
        // a forever: the until is never discharged.
        assert!(!accepts(&bdd, &aut, &[], &[only_a]));
        // neither a nor b.
        assert!(!accepts(&bdd, &aut, &[], &[neither]));
    }

    #[test]
    fn test_globally() {
        let (bdd, dict, aut) = setup("G a");
        let a = dict.var("a").unwrap() as i32;
        let yes = bdd.cube([a]);
        let no = bdd.cube([-a]);

        assert!(accepts(&bdd, &aut, &[], &[yes]));
        assert!(!accepts(&bdd, &aut, &[yes, yes], &[no]));
    }

    #[test]
    fn test_request_response() {
        let (bdd, dict, aut) = setup("G(req -> F ack)");
        let req = dict.var("req").unwrap() as i32;
        let ack = dict.var("ack").unwrap() as i32;
        let idle = bdd.cube([-req, -ack]);
        let r = bdd.cube([req, -ack]);
        let k = bdd.cube([-req, ack]);

        // Every request is eventually answered.
        assert!(accepts(&bdd, &aut, &[], &[r, k]));
        assert!(accepts(&bdd, &aut, &[], &[idle]));
        // A request never answered.
        assert!(!accepts(&bdd, &aut, &[r], &[idle]));
    }

    #[test]
    fn test_next() {
        let (bdd, dict, aut) = setup("X a");
        let a = dict.var("a").unwrap() as i32;
        let yes = bdd.cube([a]);
        let no = bdd.cube([-a]);

        assert!(accepts(&bdd, &aut, &[no, yes], &[no]));
        assert!(!accepts(&bdd, &aut, &[no, no], &[yes]));
    }
}

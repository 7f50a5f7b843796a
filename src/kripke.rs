//! Kripke-structure view of the zone graph.
//!
//! The adapter wraps zone-graph configurations into pooled, reference
//! counted state handles and labels every state with a cube over the
//! compiled propositions. Successor enumeration hands out an iterator whose
//! shell is recycled between calls, so steady-state exploration does not
//! allocate.
//!
//! Deadlocks are handled through a pair of marker conditions. Every edge
//! condition of a live state is conjoined with `alive`, every edge
//! condition of a dead state with `dead`; a dead state whose marked
//! condition is satisfiable gets a self-loop so that maximal finite
//! behaviors show up as infinite ones.

use std::rc::Rc;

use log::debug;

use crate::bdd::Bdd;
use crate::dict::VarDict;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::props::{self, Prop};
use crate::reference::Ref;
use crate::state::{StateId, StatePool};
use crate::zg::ZoneGraph;
use crate::zone;

/// How deadlocked configurations take part in the checked behavior.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dead {
    /// Finite behaviors are invisible: dead states get no self-loop.
    Ignore,
    /// Dead states loop silently, so finite behaviors are checked too.
    #[default]
    Allow,
    /// Dead states loop with this proposition set, and live states carry
    /// its negation.
    Named(String),
}

/// Successor batch walker. Obtained from [`Kripke::succ_iter`] and given
/// back through [`Kripke::recycle`].
pub struct SuccIter {
    batch: Vec<StateId>,
    pos: usize,
    cond: Ref,
}

impl SuccIter {
    /// Position on the first successor. True if there is one.
    pub fn first(&mut self) -> bool {
        self.pos = 0;
        !self.batch.is_empty()
    }

    /// Step to the next successor. True while one remains.
    pub fn next(&mut self) -> bool {
        self.pos += 1;
        self.pos < self.batch.len()
    }

    pub fn done(&self) -> bool {
        self.pos >= self.batch.len()
    }

    /// The current successor. The reference stays owned by the iterator;
    /// callers that keep the state must retain it.
    pub fn current(&self) -> StateId {
        assert!(!self.done(), "iterator is exhausted");
        self.batch[self.pos]
    }

    /// Condition of the edges leading to the successors of this batch.
    pub fn cond(&self) -> Ref {
        self.cond
    }
}

pub struct Kripke<'b> {
    bdd: &'b Bdd,
    zg: ZoneGraph,
    pool: StatePool,
    props: Vec<Prop>,
    dead: Dead,
    dead_var: Option<u32>,
    alive_prop: Ref,
    dead_prop: Ref,
    iter_cache: Option<SuccIter>,
}

impl<'b> Kripke<'b> {
    /// Compile `atoms` against the model and set up the state pool with
    /// `2^pool_bits` slots. Registers one dictionary variable per atom plus
    /// one for a named dead marker; `release` undoes all of them.
    pub fn new(
        bdd: &'b Bdd,
        zg: ZoneGraph,
        atoms: &[String],
        dead: Dead,
        dict: &mut VarDict,
        pool_bits: usize,
    ) -> Result<Self> {
        // The dead marker is evaluated by the loop synthesis, never as a
        // regular proposition.
        let observable: Vec<String> = atoms
            .iter()
            .filter(|a| !matches!(&dead, Dead::Named(name) if name == *a))
            .cloned()
            .collect();
        let props = props::compile(&observable, zg.model(), dict)?;

        let mut dead_var = None;
        let (alive_prop, dead_prop) = match &dead {
            Dead::Ignore => (bdd.one, bdd.zero),
            Dead::Allow => (bdd.one, bdd.one),
            Dead::Named(name) => {
                let v = dict.register(name);
                dead_var = Some(v);
                let var = bdd.mk_var(v);
                (-var, var)
            }
        };

        Ok(Self {
            bdd,
            zg,
            pool: StatePool::new(pool_bits),
            props,
            dead,
            dead_var,
            alive_prop,
            dead_prop,
            iter_cache: None,
        })
    }

    pub fn model(&self) -> &Rc<Model> {
        self.zg.model()
    }

    pub fn pool(&self) -> &StatePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut StatePool {
        &mut self.pool
    }

    /// The unique initial state, as a fresh reference owned by the caller.
    pub fn init_state(&mut self) -> Result<StateId> {
        let mut initial = self.zg.initial();
        if initial.len() > 1 {
            return Err(Error::UnsupportedModel(
                "multiple initial states not supported".to_string(),
            ));
        }
        let Some(cfg) = initial.pop() else {
            return Err(Error::UnsupportedModel(
                "model has no initial state".to_string(),
            ));
        };
        Ok(self.pool.insert(Rc::new(cfg)))
    }

    /// Enumerate the successors of `st`. The batch states are owned by the
    /// returned iterator until it is recycled.
    pub fn succ_iter(&mut self, st: StateId) -> SuccIter {
        let mut batch: Vec<StateId> = self
            .zg
            .outgoing(self.pool.config(st))
            .into_iter()
            .map(|cfg| self.pool.insert(Rc::new(cfg)))
            .collect();

        let mut cond = self.state_condition(st);
        if !batch.is_empty() {
            cond = self.bdd.apply_and(cond, self.alive_prop);
        } else {
            cond = self.bdd.apply_and(cond, self.dead_prop);
            if !self.bdd.is_zero(cond) {
                // The dead state loops on itself.
                batch.push(self.pool.retain(st));
            }
        }

        match self.iter_cache.take() {
            Some(mut it) => {
                it.batch = batch;
                it.pos = 0;
                it.cond = cond;
                it
            }
            None => SuccIter { batch, pos: 0, cond },
        }
    }

    /// Take the iterator back, dropping its remaining state references.
    pub fn recycle(&mut self, mut it: SuccIter) {
        for st in it.batch.drain(..) {
            self.pool.release(st);
        }
        self.iter_cache = Some(it);
    }

    /// Cube over the proposition variables describing `st`.
    pub fn state_condition(&self, st: StateId) -> Ref {
        let cfg = self.pool.config(st);
        let literals: Vec<i32> = self
            .props
            .iter()
            .map(|p| {
                let var = p.var as i32;
                if p.holds(cfg) {
                    var
                } else {
                    -var
                }
            })
            .collect();
        self.bdd.cube(literals)
    }

    pub fn format_state(&self, st: StateId) -> String {
        let model = self.zg.model();
        let cfg = self.pool.config(st);
        let mut parts = Vec::new();

        let vloc: Vec<String> = cfg
            .vloc
            .iter()
            .map(|&l| {
                let loc = &model.locations[l];
                format!("{}.{}", model.processes[loc.pid].name, loc.name)
            })
            .collect();
        parts.push(vloc.join(","));

        for (v, &val) in model.intvars.iter().zip(&cfg.ints) {
            parts.push(format!("{}={}", v.name, val));
        }

        for (c, clock) in model.clocks.iter().enumerate() {
            let (lo, hi) = cfg.zone.clock_bounds(c);
            parts.push(format_clock(&clock.name, lo, hi));
        }

        parts.join(" ")
    }

    /// Render a cube condition as a literal list, e.g. `P.run & !"n >= 1"`.
    pub fn format_condition(&self, cond: Ref) -> String {
        let Some(literals) = self.bdd.cube_literals(cond) else {
            return "0".to_string();
        };
        if literals.is_empty() {
            return "1".to_string();
        }
        let parts: Vec<String> = literals
            .iter()
            .map(|&l| {
                let name = quoted(self.prop_name(l.unsigned_abs()));
                if l > 0 {
                    name
                } else {
                    format!("!{}", name)
                }
            })
            .collect();
        parts.join(" & ")
    }

    /// Names of the propositions a cube condition asserts positively.
    pub fn positive_literals(&self, cond: Ref) -> Vec<String> {
        self.bdd
            .cube_literals(cond)
            .unwrap_or_default()
            .into_iter()
            .filter(|&l| l > 0)
            .map(|l| self.prop_name(l as u32).to_string())
            .collect()
    }

    fn prop_name(&self, var: u32) -> &str {
        if self.dead_var == Some(var) {
            if let Dead::Named(name) = &self.dead {
                return name;
            }
        }
        self.props
            .iter()
            .find(|p| p.var == var)
            .map(|p| p.name.as_str())
            .expect("condition variables come from compiled propositions")
    }

    pub fn retain(&mut self, st: StateId) -> StateId {
        self.pool.retain(st)
    }

    pub fn release_state(&mut self, st: StateId) {
        self.pool.release(st);
    }

    /// Tear the adapter down: drop every pooled state and unregister every
    /// dictionary variable this adapter registered.
    pub fn release(mut self, dict: &mut VarDict) {
        if self.pool.live() > 0 {
            debug!("teardown with {} live state(s)", self.pool.live());
        }
        if let Some(mut it) = self.iter_cache.take() {
            for st in it.batch.drain(..) {
                self.pool.release(st);
            }
        }
        self.pool.clear();
        for prop in &self.props {
            dict.unregister(&prop.name);
        }
        if let Dead::Named(name) = &self.dead {
            dict.unregister(name);
        }
    }
}

fn quoted(name: &str) -> String {
    if name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        name.to_string()
    } else {
        format!("\"{}\"", name)
    }
}

/// Render the packed zone bounds of one clock, e.g. `1<=x<5` or `x>2`.
fn format_clock(name: &str, lo: i32, hi: i32) -> String {
    // lo is the packed bound on `0 - x`, so the lower bound is its negation.
    let lo_val = -(lo >> 1);
    let lo_weak = lo & 1 == 1;
    if hi == zone::INF {
        let op = if lo_weak { ">=" } else { ">" };
        format!("{}{}{}", name, op, lo_val)
    } else {
        let hi_val = hi >> 1;
        let lo_op = if lo_weak { "<=" } else { "<" };
        let hi_op = if hi & 1 == 1 { "<=" } else { "<" };
        format!("{}{}{}{}{}", lo_val, lo_op, name, hi_op, hi_val)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    // One transition into a deadlocked sink.
    const SINK: &str = "\
system:sink
event:tau
int:1:0:3:0:n
process:P
location:P:run{initial:}
location:P:stop{}
edge:P:run:stop:tau{do: n=n+1}
";

    fn kripke<'b>(bdd: &'b Bdd, dead: Dead, atoms: &[&str], dict: &mut VarDict) -> Kripke<'b> {
        let model = Model::parse(SINK).unwrap();
        let zg = ZoneGraph::new(model);
        let atoms: Vec<String> = atoms.iter().map(|s| s.to_string()).collect();
        Kripke::new(bdd, zg, &atoms, dead, dict, 8).unwrap()
    }

    #[test]
    fn test_init_state_is_unique_reference() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Allow, &[], &mut dict);

        let s = k.init_state().unwrap();
        assert_eq!(k.pool().live(), 1);
        assert!(k.format_state(s).contains("P.run"));
        k.release_state(s);
        assert_eq!(k.pool().live(), 0);
    }

    #[test]
    fn test_state_condition_is_cube_over_props() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Allow, &["P.run", "n >= 1"], &mut dict);

        let s = k.init_state().unwrap();
        let cond = k.state_condition(s);
        let run = dict.var("P.run").unwrap() as i32;
        let n1 = dict.var("n >= 1").unwrap() as i32;
        assert_eq!(cond, bdd.cube([run, -n1]));
        k.release_state(s);
    }

    #[test]
    fn test_dead_allow_synthesizes_self_loop() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Allow, &[], &mut dict);

        let s = k.init_state().unwrap();
        let mut it = k.succ_iter(s);
        assert!(it.first());
        let stop = it.current();
        let stop = k.retain(stop);
        assert!(!it.next());
        k.recycle(it);

        // `stop` has no outgoing edge: it must loop on itself.
        let mut it = k.succ_iter(stop);
        assert!(it.first());
        assert_eq!(k.pool().compare(it.current(), stop), std::cmp::Ordering::Equal);
        assert!(!bdd.is_zero(it.cond()));
        k.recycle(it);
        k.release_state(stop);
        k.release_state(s);
        assert_eq!(k.pool().live(), 0);
    }

    #[test]
    fn test_dead_ignore_cuts_finite_behaviors() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Ignore, &[], &mut dict);

        let s = k.init_state().unwrap();
        let mut it = k.succ_iter(s);
        assert!(it.first());
        let stop = k.retain(it.current());
        k.recycle(it);

        let mut it = k.succ_iter(stop);
        // No self-loop and an unsatisfiable condition.
        assert!(!it.first());
        assert!(it.done());
        assert!(bdd.is_zero(it.cond()));
        k.recycle(it);
        k.release_state(stop);
        k.release_state(s);
    }

    #[test]
    fn test_dead_named_marks_the_loop() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Named("dead".to_string()), &[], &mut dict);
        let dead_var = bdd.mk_var(dict.var("dead").unwrap());

        let s = k.init_state().unwrap();
        let mut it = k.succ_iter(s);
        assert!(it.first());
        let stop = k.retain(it.current());
        // Live state: the condition implies !dead.
        assert_eq!(bdd.apply_imply(it.cond(), -dead_var), bdd.one);
        k.recycle(it);

        let mut it = k.succ_iter(stop);
        assert!(it.first());
        // Dead state: the condition implies dead.
        assert_eq!(bdd.apply_imply(it.cond(), dead_var), bdd.one);
        k.recycle(it);
        k.release_state(stop);
        k.release_state(s);
    }

    #[test]
    fn test_multiple_initial_states_are_rejected() {
        let twin = "\
system:twin
event:tau
process:P
location:P:a{initial:}
location:P:b{initial:}
edge:P:a:b:tau{}
";
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let model = Model::parse(twin).unwrap();
        let zg = ZoneGraph::new(model);
        let mut k = Kripke::new(&bdd, zg, &[], Dead::Allow, &mut dict, 8).unwrap();

        match k.init_state() {
            Err(Error::UnsupportedModel(msg)) => assert!(msg.contains("multiple initial")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("two initial locations must be rejected"),
        }
        k.release(&mut dict);
    }

    #[test]
    fn test_condition_renders_as_literal_list() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Allow, &["P.run", "n >= 1"], &mut dict);

        let s = k.init_state().unwrap();
        let cond = k.state_condition(s);
        assert_eq!(k.format_condition(cond), "P.run & !\"n >= 1\"");
        assert_eq!(k.positive_literals(cond), vec!["P.run".to_string()]);
        assert_eq!(k.format_condition(bdd.one), "1");
        assert_eq!(k.format_condition(bdd.zero), "0");
        k.release_state(s);
    }

    #[test]
    fn test_named_dead_condition_names_the_marker() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(&bdd, Dead::Named("dead".to_string()), &[], &mut dict);

        let s = k.init_state().unwrap();
        let mut it = k.succ_iter(s);
        assert!(it.first());
        let stop = k.retain(it.current());
        let live_cond = it.cond();
        k.recycle(it);
        assert_eq!(k.format_condition(live_cond), "!dead");

        let it = k.succ_iter(stop);
        assert_eq!(k.format_condition(it.cond()), "dead");
        assert_eq!(k.positive_literals(it.cond()), vec!["dead".to_string()]);
        k.recycle(it);
        k.release_state(stop);
        k.release_state(s);
    }

    #[test]
    fn test_teardown_unregisters_everything() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        let mut k = kripke(
            &bdd,
            Dead::Named("dead".to_string()),
            &["P.stop", "n >= 1"],
            &mut dict,
        );
        assert_eq!(dict.len(), 3);

        // Leave live states behind on purpose.
        let s = k.init_state().unwrap();
        let _it = k.succ_iter(s);
        k.release(&mut dict);
        assert!(dict.is_empty());
    }

    #[test]
    fn test_named_dead_atom_is_not_compiled() {
        let bdd = Bdd::default();
        let mut dict = VarDict::new();
        // "dead" appears in the formula atoms but is the dead marker, so it
        // must not be resolved against the model.
        let k = kripke(&bdd, Dead::Named("dead".to_string()), &["dead"], &mut dict);
        assert_eq!(dict.len(), 1);
        k.release(&mut dict);
        assert!(dict.is_empty());
    }
}

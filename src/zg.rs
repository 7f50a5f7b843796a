//! The zone-graph engine.
//!
//! Enumerates the configurations of the timed automaton under elapsed-zone
//! semantics: every configuration's zone is closed under time elapse (within
//! the location invariant) and extrapolated with the model's maximal clock
//! constant, so the graph is finite. Both enumeration entry points
//! materialize their results as a batch, mirroring the one-shot forward-only
//! ranges the Kripke adapter consumes.

use std::rc::Rc;

use log::{trace, warn};

use crate::model::{Edge, Guard, Model, Update, VarRef};
use crate::zone::Dbm;

/// One concrete configuration: a control location per process, a valuation
/// of the integer variables, and a clock zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Config {
    /// Global location id, indexed by process id.
    pub vloc: Vec<usize>,
    pub ints: Vec<i32>,
    pub zone: Dbm,
}

pub struct ZoneGraph {
    model: Rc<Model>,
    /// Extrapolation bound.
    k: i32,
}

impl ZoneGraph {
    pub fn new(model: Rc<Model>) -> Self {
        let k = model.max_clock_constant();
        Self { model, k }
    }

    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    /// Enumerate the initial configurations, one per combination of initial
    /// locations across processes.
    pub fn initial(&self) -> Vec<Config> {
        let mut vlocs = vec![Vec::new()];
        for pid in 0..self.model.processes.len() {
            let initials = self.model.initial_locations(pid);
            let mut next = Vec::new();
            for vloc in &vlocs {
                for &l in &initials {
                    let mut v = vloc.clone();
                    v.push(l);
                    next.push(v);
                }
            }
            vlocs = next;
        }

        let ints: Vec<i32> = self.model.intvars.iter().map(|v| v.init).collect();
        let mut out = Vec::new();
        for vloc in vlocs {
            let mut zone = Dbm::zero(self.model.clocks.len());
            if !self.close_zone(&mut zone, &vloc) {
                continue;
            }
            out.push(Config {
                vloc,
                ints: ints.clone(),
                zone,
            });
        }
        out
    }

    /// Enumerate the successor configurations of `cfg`, one per enabled
    /// edge firing (asynchronous edges and synchronized edge vectors).
    pub fn outgoing(&self, cfg: &Config) -> Vec<Config> {
        let mut out = Vec::new();
        for firing in self.enabled_firings(cfg) {
            if let Some(succ) = self.fire(cfg, &firing) {
                out.push(succ);
            }
        }
        trace!("outgoing: {} successor(s)", out.len());
        out
    }

    /// Collect candidate firings: each is a set of edges, at most one per
    /// process, whose sources match `cfg` and whose events synchronize.
    fn enabled_firings(&self, cfg: &Config) -> Vec<Vec<&Edge>> {
        let mut firings: Vec<Vec<&Edge>> = Vec::new();

        // Asynchronous edges: events not taking part in any sync vector.
        for edge in &self.model.edges {
            if cfg.vloc[edge.pid] == edge.src && !self.model.is_synchronized(edge.pid, edge.event)
            {
                firings.push(vec![edge]);
            }
        }

        // Synchronized vectors: the cartesian product of matching edges of
        // every participant.
        for sv in &self.model.syncs {
            let mut combos: Vec<Vec<&Edge>> = vec![Vec::new()];
            for &(pid, event) in sv {
                let candidates: Vec<&Edge> = self
                    .model
                    .edges
                    .iter()
                    .filter(|e| e.pid == pid && e.event == event && cfg.vloc[pid] == e.src)
                    .collect();
                let mut next = Vec::new();
                for combo in &combos {
                    for &e in &candidates {
                        let mut c = combo.clone();
                        c.push(e);
                        next.push(c);
                    }
                }
                combos = next;
                if combos.is_empty() {
                    break;
                }
            }
            firings.extend(combos.into_iter().filter(|c| c.len() == sv.len()));
        }

        firings
    }

    fn fire(&self, cfg: &Config, firing: &[&Edge]) -> Option<Config> {
        // Integer guards first: they are free to evaluate.
        for edge in firing {
            for g in &edge.guard {
                if let VarRef::Int(v) = g.var {
                    if !g.op.eval(cfg.ints[v], g.val) {
                        return None;
                    }
                }
            }
        }

        // Clock guards.
        let mut zone = cfg.zone.clone();
        for edge in firing {
            constrain_clocks(&mut zone, &edge.guard);
        }
        zone.canonicalize();
        if zone.is_empty() {
            return None;
        }

        // Effects: integer assignments in order, then clock resets.
        let mut ints = cfg.ints.clone();
        for edge in firing {
            for update in &edge.updates {
                match update {
                    Update::Assign { var, expr } => {
                        let val = expr.eval(&ints);
                        let iv = &self.model.intvars[*var];
                        if val < iv.min || val > iv.max {
                            warn!(
                                "assignment puts `{}` out of range ({}), edge blocked",
                                iv.name, val
                            );
                            return None;
                        }
                        ints[*var] = val;
                    }
                    Update::Reset { clock, val } => zone.reset(*clock, *val),
                }
            }
        }

        // Move the control locations.
        let mut vloc = cfg.vloc.clone();
        for edge in firing {
            vloc[edge.pid] = edge.dst;
        }

        if !self.close_zone(&mut zone, &vloc) {
            return None;
        }
        Some(Config { vloc, ints, zone })
    }

    /// Elapsed-zone closure: intersect with the invariant, let time elapse,
    /// intersect again, then extrapolate. Returns false if the zone died.
    fn close_zone(&self, zone: &mut Dbm, vloc: &[usize]) -> bool {
        let invariants: Vec<&Guard> = vloc
            .iter()
            .flat_map(|&l| self.model.locations[l].invariant.iter())
            .collect();

        for g in &invariants {
            if let VarRef::Clock(c) = g.var {
                zone.constrain(c, g.op, g.val);
            }
        }
        zone.canonicalize();
        if zone.is_empty() {
            return false;
        }

        zone.up();
        for g in &invariants {
            if let VarRef::Clock(c) = g.var {
                zone.constrain(c, g.op, g.val);
            }
        }
        zone.canonicalize();
        if zone.is_empty() {
            return false;
        }

        zone.extrapolate(self.k);
        true
    }
}

fn constrain_clocks(zone: &mut Dbm, guards: &[Guard]) {
    for g in guards {
        if let VarRef::Clock(c) = g.var {
            zone.constrain(c, g.op, g.val);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::model::Model;

    fn toggle() -> Rc<Model> {
        Model::parse(
            "\
system:toggle
event:tau
clock:1:x
process:P
location:P:off{initial:}
location:P:on{}
edge:P:off:on:tau{provided: x>=1 : do: x=0}
edge:P:on:off:tau{}
",
        )
        .unwrap()
    }

    #[test]
    fn test_single_initial_config() {
        let zg = ZoneGraph::new(toggle());
        let init = zg.initial();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].vloc, vec![0]);
    }

    #[test]
    fn test_successors_follow_edges() {
        let model = toggle();
        let zg = ZoneGraph::new(model.clone());
        let init = zg.initial().remove(0);

        let succs = zg.outgoing(&init);
        assert_eq!(succs.len(), 1);
        let on = model.location(0, "on").unwrap();
        assert_eq!(succs[0].vloc, vec![on]);

        let back = zg.outgoing(&succs[0]);
        assert_eq!(back.len(), 1);
        let off = model.location(0, "off").unwrap();
        assert_eq!(back[0].vloc, vec![off]);
    }

    #[test]
    fn test_exploration_terminates() {
        // The zone graph must be finite thanks to extrapolation.
        let zg = ZoneGraph::new(toggle());
        let mut seen = std::collections::HashSet::new();
        let mut todo = zg.initial();
        while let Some(cfg) = todo.pop() {
            if seen.insert(cfg.clone()) {
                todo.extend(zg.outgoing(&cfg));
            }
            assert!(seen.len() < 100, "zone graph does not converge");
        }
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_int_guard_blocks_edge() {
        let model = Model::parse(
            "\
system:m
event:tau
int:1:0:1:0:b
process:P
location:P:l0{initial:}
location:P:l1{}
edge:P:l0:l1:tau{provided: b==1}
",
        )
        .unwrap();
        let zg = ZoneGraph::new(model);
        let init = zg.initial().remove(0);
        assert!(zg.outgoing(&init).is_empty());
    }

    #[test]
    fn test_sync_fires_jointly() {
        let model = Model::parse(
            "\
system:m
event:go
process:P
location:P:p0{initial:}
location:P:p1{}
process:Q
location:Q:q0{initial:}
location:Q:q1{}
edge:P:p0:p1:go{}
edge:Q:q0:q1:go{}
sync:P@go:Q@go
",
        )
        .unwrap();
        let zg = ZoneGraph::new(model.clone());
        let init = zg.initial().remove(0);
        let succs = zg.outgoing(&init);
        assert_eq!(succs.len(), 1);
        let p1 = model.location(0, "p1").unwrap();
        let q1 = model.location(1, "q1").unwrap();
        assert_eq!(succs[0].vloc, vec![p1, q1]);
    }
}

//! Property checking entry points.
//!
//! Wires the pipeline together: compile the negated property's atoms
//! against the model, translate the negation to a Büchi automaton over the
//! same dictionary, and search the product with the zone-graph Kripke
//! structure for an accepting run. A run is a counterexample to the
//! property; its absence proves the property on every behavior of the
//! model.

use std::fmt;
use std::io::Write;
use std::rc::Rc;

use log::info;

use crate::bdd::Bdd;
use crate::buchi::translate;
use crate::dict::VarDict;
use crate::dot;
use crate::emptiness::{find_accepting_run, Run, Step};
use crate::error::Result;
use crate::kripke::{Dead, Kripke};
use crate::ltl::Formula;
use crate::model::Model;
use crate::zg::ZoneGraph;

pub struct Options {
    pub dead: Dead,
    /// log2 of the state pool capacity.
    pub pool_bits: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dead: Dead::Allow,
            pool_bits: 20,
        }
    }
}

pub enum Outcome {
    Verified,
    Violated(Counterexample),
}

/// A violating lasso, rendered into strings. Each line pairs a state with
/// the edge condition of the step, as a literal list in brackets.
pub struct Counterexample {
    pub prefix: Vec<String>,
    pub cycle: Vec<String>,
}

impl Counterexample {
    fn render(kripke: &Kripke<'_>, run: &Run) -> Self {
        let line = |s: &Step| {
            format!(
                "{} [{}]",
                kripke.format_state(s.state),
                kripke.format_condition(s.cond)
            )
        };
        Self {
            prefix: run.prefix.iter().map(line).collect(),
            cycle: run.cycle.iter().map(line).collect(),
        }
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prefix:")?;
        for s in &self.prefix {
            writeln!(f, "  {}", s)?;
        }
        writeln!(f, "Cycle:")?;
        for s in &self.cycle {
            writeln!(f, "  {}", s)?;
        }
        Ok(())
    }
}

/// Check `property` on every infinite behavior of `model`.
pub fn check(model: Rc<Model>, property: &Formula, opts: &Options) -> Result<Outcome> {
    info!("checking `{}`", property);
    let bdd = Bdd::default();
    let mut dict = VarDict::new();

    let negated = property.clone().not();
    let atoms = negated.atoms();
    let zg = ZoneGraph::new(model);
    let mut kripke = Kripke::new(&bdd, zg, &atoms, opts.dead.clone(), &mut dict, opts.pool_bits)?;
    let aut = translate(&negated, &bdd, &dict);
    info!("negated property automaton: {} state(s)", aut.len());

    let outcome = match find_accepting_run(&mut kripke, &aut, &bdd) {
        Ok(None) => Ok(Outcome::Verified),
        Ok(Some(run)) => Ok(Outcome::Violated(Counterexample::render(&kripke, &run))),
        Err(e) => Err(e),
    };
    kripke.release(&mut dict);
    debug_assert!(dict.is_empty());
    outcome
}

/// Render the reachable state space as DOT. With a property, a violating
/// run (if any) is highlighted; returns true when one was found.
pub fn dump_dot(
    out: &mut impl Write,
    model: Rc<Model>,
    property: Option<&Formula>,
    opts: &Options,
    name: &str,
) -> Result<bool> {
    let bdd = Bdd::default();
    let mut dict = VarDict::new();

    let atoms = match property {
        Some(f) => f.clone().not().atoms(),
        None => Vec::new(),
    };
    let zg = ZoneGraph::new(model);
    let mut kripke = Kripke::new(&bdd, zg, &atoms, opts.dead.clone(), &mut dict, opts.pool_bits)?;

    let result: Result<bool> = (|| {
        let run = match property {
            Some(f) => {
                let aut = translate(&f.clone().not(), &bdd, &dict);
                find_accepting_run(&mut kripke, &aut, &bdd)?
            }
            None => None,
        };
        dot::dump(out, &mut kripke, run.as_ref(), name)?;
        Ok(run.is_some())
    })();
    kripke.release(&mut dict);
    result
}

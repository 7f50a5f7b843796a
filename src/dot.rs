//! DOT rendering of the reachable state space.
//!
//! Walks the Kripke structure breadth-first from the initial state and
//! prints one node per distinct configuration, labeled the way
//! [`Kripke::format_state`] prints it. A counterexample run can be
//! highlighted; its states are drawn thick and red.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io::Write;

use crate::emptiness::Run;
use crate::error::Result;
use crate::kripke::Kripke;
use crate::state::{StateId, StateTable};

pub fn dump(
    out: &mut impl Write,
    kripke: &mut Kripke<'_>,
    run: Option<&Run>,
    name: &str,
) -> Result<()> {
    let highlight: Vec<StateId> = run
        .map(|r| r.prefix.iter().chain(&r.cycle).map(|s| s.state).collect())
        .unwrap_or_default();
    let highlighted = |k: &Kripke<'_>, s: StateId| {
        highlight
            .iter()
            .any(|&h| k.pool().compare(h, s) == Ordering::Equal)
    };

    writeln!(out, "digraph \"{}\" {{", name)?;
    writeln!(out, "  rankdir=LR")?;
    writeln!(out, "  label=\"{}\"", name)?;
    writeln!(out, "  node [shape=box, style=rounded]")?;
    writeln!(out, "  I [label=\"\", style=invis, width=0]")?;
    writeln!(out, "  I -> 0")?;

    // Canonicalized states double as node ids via their visit order.
    let mut table = StateTable::new();
    let mut order: Vec<StateId> = Vec::new();
    let mut queue = VecDeque::new();

    let init = kripke.init_state()?;
    let init = table.canonicalize(kripke.pool_mut(), init);
    order.push(init);
    queue.push_back(init);

    let index_of = |order: &[StateId], s: StateId| {
        order
            .iter()
            .position(|&o| o == s)
            .expect("successors are interned before use")
    };

    while let Some(s) = queue.pop_front() {
        let id = index_of(&order, s);
        let attrs = if highlighted(kripke, s) {
            ", color=red, penwidth=2"
        } else {
            ""
        };
        writeln!(
            out,
            "  {} [label=\"{}\"{}]",
            id,
            kripke.format_state(s),
            attrs
        )?;

        let mut it = kripke.succ_iter(s);
        let cond = it.cond();
        let mut targets = Vec::new();
        if it.first() {
            loop {
                let fresh = kripke.retain(it.current());
                let canon = table.canonicalize(kripke.pool_mut(), fresh);
                targets.push(canon);
                if !it.next() {
                    break;
                }
            }
        }
        kripke.recycle(it);

        // Edges carry the propositions the step asserts.
        let label = kripke.positive_literals(cond).join(", ");
        for t in targets {
            if !order.contains(&t) {
                order.push(t);
                queue.push_back(t);
            }
            writeln!(out, "  {} -> {} [label=\"{}\"]", id, index_of(&order, t), label)?;
        }
    }

    writeln!(out, "}}")?;
    table.clear(kripke.pool_mut());
    Ok(())
}

//! Timed-automaton system model and its textual declaration parser.
//!
//! A model is a network of processes, each a finite automaton over
//! locations, synchronizing on events and sharing bounded integer variables
//! and clocks. The declaration format is line oriented, one item per line:
//!
//! ```text
//! system:NAME
//! event:NAME
//! clock:1:NAME
//! int:1:MIN:MAX:INIT:NAME
//! process:NAME
//! location:PROC:NAME{initial: : invariant: x<=10}
//! edge:PROC:SRC:DST:EVENT{provided: id==0 && x>1 : do: id=id+1; x=0}
//! sync:P@e:Q@e
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Any malformed line
//! fails the load with [`Error::ModelLoad`] carrying the line number.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::error::{Error, Result};

/// Relational comparison operator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    pub fn eval(self, lhs: i32, rhs: i32) -> bool {
        match self {
            RelOp::Eq => lhs == rhs,
            RelOp::Ne => lhs != rhs,
            RelOp::Lt => lhs < rhs,
            RelOp::Gt => lhs > rhs,
            RelOp::Le => lhs <= rhs,
            RelOp::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Gt => ">",
            RelOp::Le => "<=",
            RelOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Left-hand side of an atomic guard.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VarRef {
    Clock(usize),
    Int(usize),
}

/// Atomic comparison of a clock or integer variable against a constant.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Guard {
    pub var: VarRef,
    pub op: RelOp,
    pub val: i32,
}

/// Integer expression over variables and constants.
#[derive(Debug, Clone, PartialEq)]
pub enum IntExpr {
    Const(i32),
    Var(usize),
    Add(Box<IntExpr>, Box<IntExpr>),
    Sub(Box<IntExpr>, Box<IntExpr>),
}

impl IntExpr {
    pub fn eval(&self, vals: &[i32]) -> i32 {
        match self {
            IntExpr::Const(c) => *c,
            IntExpr::Var(v) => vals[*v],
            IntExpr::Add(a, b) => a.eval(vals).wrapping_add(b.eval(vals)),
            IntExpr::Sub(a, b) => a.eval(vals).wrapping_sub(b.eval(vals)),
        }
    }
}

/// Effect of taking an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Assign { var: usize, expr: IntExpr },
    Reset { clock: usize, val: i32 },
}

#[derive(Debug)]
pub struct Location {
    pub pid: usize,
    pub name: String,
    pub initial: bool,
    pub invariant: Vec<Guard>,
}

#[derive(Debug)]
pub struct Process {
    pub name: String,
    /// Global location ids belonging to this process.
    pub locations: Vec<usize>,
}

#[derive(Debug)]
pub struct IntVar {
    pub name: String,
    pub min: i32,
    pub max: i32,
    pub init: i32,
}

#[derive(Debug)]
pub struct Clock {
    pub name: String,
}

#[derive(Debug)]
pub struct Edge {
    pub pid: usize,
    pub src: usize,
    pub dst: usize,
    pub event: usize,
    pub guard: Vec<Guard>,
    pub updates: Vec<Update>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub name: String,
    pub events: Vec<String>,
    pub processes: Vec<Process>,
    pub clocks: Vec<Clock>,
    pub intvars: Vec<IntVar>,
    pub locations: Vec<Location>,
    pub edges: Vec<Edge>,
    /// Synchronization vectors: every listed (process, event) pair must
    /// fire one matching edge jointly.
    pub syncs: Vec<Vec<(usize, usize)>>,
}

impl Model {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Rc<Model>> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Rc<Model>> {
        Parser::new(text).run().map(Rc::new)
    }

    pub fn process(&self, name: &str) -> Option<usize> {
        self.processes.iter().position(|p| p.name == name)
    }

    pub fn event(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e == name)
    }

    pub fn clock(&self, name: &str) -> Option<usize> {
        self.clocks.iter().position(|c| c.name == name)
    }

    pub fn intvar(&self, name: &str) -> Option<usize> {
        self.intvars.iter().position(|v| v.name == name)
    }

    /// Global id of the location `name` of process `pid`.
    pub fn location(&self, pid: usize, name: &str) -> Option<usize> {
        self.processes[pid]
            .locations
            .iter()
            .copied()
            .find(|&l| self.locations[l].name == name)
    }

    pub fn initial_locations(&self, pid: usize) -> Vec<usize> {
        self.processes[pid]
            .locations
            .iter()
            .copied()
            .filter(|&l| self.locations[l].initial)
            .collect()
    }

    /// True when `event` takes part in some synchronization vector.
    pub fn is_synchronized(&self, pid: usize, event: usize) -> bool {
        self.syncs
            .iter()
            .any(|sv| sv.iter().any(|&(p, e)| p == pid && e == event))
    }

    /// Largest constant a clock is compared against, used as the
    /// extrapolation bound of the zone graph.
    pub fn max_clock_constant(&self) -> i32 {
        let mut k = 0;
        let clock_consts = |guards: &[Guard], k: &mut i32| {
            for g in guards {
                if let VarRef::Clock(_) = g.var {
                    *k = (*k).max(g.val.abs());
                }
            }
        };
        for loc in &self.locations {
            clock_consts(&loc.invariant, &mut k);
        }
        for edge in &self.edges {
            clock_consts(&edge.guard, &mut k);
        }
        k
    }

    /// List the location and variable names usable in formulas.
    pub fn dump_info(&self, out: &mut impl fmt::Write) -> fmt::Result {
        let mut first = true;
        for loc in &self.locations {
            if first {
                writeln!(out, "The following location(s) may be used in the formula:")?;
                first = false;
            }
            writeln!(out, "- {}.{}", self.processes[loc.pid].name, loc.name)?;
        }
        let mut first = true;
        for var in &self.intvars {
            if first {
                writeln!(out, "The following variable(s) may be used in the formula:")?;
                first = false;
            }
            writeln!(out, "- {} ({}..{})", var.name, var.min, var.max)?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    text: &'a str,
    line: usize,
    model: Model,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            line: 0,
            model: Model::default(),
        }
    }

    fn fail<T>(&self, msg: impl Into<String>) -> Result<T> {
        Err(Error::ModelLoad {
            line: self.line,
            msg: msg.into(),
        })
    }

    fn run(mut self) -> Result<Model> {
        for (lineno, raw) in self.text.lines().enumerate() {
            self.line = lineno + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((kind, rest)) = line.split_once(':') else {
                return self.fail(format!("expected `kind:...`, got `{}`", line));
            };
            match kind.trim() {
                "system" => self.model.name = rest.trim().to_string(),
                "event" => self.parse_event(rest)?,
                "clock" => self.parse_clock(rest)?,
                "int" => self.parse_int(rest)?,
                "process" => self.parse_process(rest)?,
                "location" => self.parse_location(rest)?,
                "edge" => self.parse_edge(rest)?,
                "sync" => self.parse_sync(rest)?,
                other => return self.fail(format!("unknown declaration `{}`", other)),
            }
        }
        if self.model.processes.is_empty() {
            self.line = 0;
            return self.fail("model declares no process");
        }
        Ok(self.model)
    }

    fn parse_event(&mut self, rest: &str) -> Result<()> {
        let name = rest.trim();
        if name.is_empty() {
            return self.fail("empty event name");
        }
        if self.model.event(name).is_some() {
            return self.fail(format!("duplicate event `{}`", name));
        }
        self.model.events.push(name.to_string());
        Ok(())
    }

    fn parse_clock(&mut self, rest: &str) -> Result<()> {
        let parts: Vec<&str> = rest.split(':').map(str::trim).collect();
        if parts.len() != 2 {
            return self.fail("expected `clock:SIZE:NAME`");
        }
        if parts[0] != "1" {
            return self.fail("clock arrays are not supported");
        }
        if self.model.clock(parts[1]).is_some() {
            return self.fail(format!("duplicate clock `{}`", parts[1]));
        }
        self.model.clocks.push(Clock {
            name: parts[1].to_string(),
        });
        Ok(())
    }

    fn parse_int(&mut self, rest: &str) -> Result<()> {
        let parts: Vec<&str> = rest.split(':').map(str::trim).collect();
        if parts.len() != 5 {
            return self.fail("expected `int:SIZE:MIN:MAX:INIT:NAME`");
        }
        if parts[0] != "1" {
            return self.fail("integer arrays are not supported");
        }
        let min = self.parse_i32(parts[1])?;
        let max = self.parse_i32(parts[2])?;
        let init = self.parse_i32(parts[3])?;
        let name = parts[4];
        if min > max || init < min || init > max {
            return self.fail(format!("inconsistent bounds for `{}`", name));
        }
        if self.model.intvar(name).is_some() {
            return self.fail(format!("duplicate variable `{}`", name));
        }
        self.model.intvars.push(IntVar {
            name: name.to_string(),
            min,
            max,
            init,
        });
        Ok(())
    }

    fn parse_process(&mut self, rest: &str) -> Result<()> {
        let name = rest.trim();
        if name.is_empty() {
            return self.fail("empty process name");
        }
        if self.model.process(name).is_some() {
            return self.fail(format!("duplicate process `{}`", name));
        }
        self.model.processes.push(Process {
            name: name.to_string(),
            locations: Vec::new(),
        });
        Ok(())
    }

    fn parse_location(&mut self, rest: &str) -> Result<()> {
        let (head, attrs) = self.split_braces(rest)?;
        let parts: Vec<&str> = head.split(':').map(str::trim).collect();
        if parts.len() != 2 {
            return self.fail("expected `location:PROC:NAME{...}`");
        }
        let Some(pid) = self.model.process(parts[0]) else {
            return self.fail(format!("unknown process `{}`", parts[0]));
        };
        if self.model.location(pid, parts[1]).is_some() {
            return self.fail(format!("duplicate location `{}.{}`", parts[0], parts[1]));
        }

        let mut initial = false;
        let mut invariant = Vec::new();
        for (key, value) in self.split_attrs(&attrs)? {
            match key.as_str() {
                "initial" => initial = true,
                "invariant" => invariant = self.parse_guards(&value)?,
                "labels" | "committed" | "urgent" => {
                    return self.fail(format!("unsupported location attribute `{}`", key))
                }
                other => return self.fail(format!("unknown location attribute `{}`", other)),
            }
        }
        for g in &invariant {
            if let VarRef::Int(_) = g.var {
                return self.fail("invariants over integer variables are not supported");
            }
        }

        let id = self.model.locations.len();
        self.model.locations.push(Location {
            pid,
            name: parts[1].to_string(),
            initial,
            invariant,
        });
        self.model.processes[pid].locations.push(id);
        Ok(())
    }

    fn parse_edge(&mut self, rest: &str) -> Result<()> {
        let (head, attrs) = self.split_braces(rest)?;
        let parts: Vec<&str> = head.split(':').map(str::trim).collect();
        if parts.len() != 4 {
            return self.fail("expected `edge:PROC:SRC:DST:EVENT{...}`");
        }
        let Some(pid) = self.model.process(parts[0]) else {
            return self.fail(format!("unknown process `{}`", parts[0]));
        };
        let Some(src) = self.model.location(pid, parts[1]) else {
            return self.fail(format!("unknown location `{}.{}`", parts[0], parts[1]));
        };
        let Some(dst) = self.model.location(pid, parts[2]) else {
            return self.fail(format!("unknown location `{}.{}`", parts[0], parts[2]));
        };
        let Some(event) = self.model.event(parts[3]) else {
            return self.fail(format!("unknown event `{}`", parts[3]));
        };

        let mut guard = Vec::new();
        let mut updates = Vec::new();
        for (key, value) in self.split_attrs(&attrs)? {
            match key.as_str() {
                "provided" => guard = self.parse_guards(&value)?,
                "do" => updates = self.parse_updates(&value)?,
                other => return self.fail(format!("unknown edge attribute `{}`", other)),
            }
        }

        self.model.edges.push(Edge {
            pid,
            src,
            dst,
            event,
            guard,
            updates,
        });
        Ok(())
    }

    fn parse_sync(&mut self, rest: &str) -> Result<()> {
        let mut vector = Vec::new();
        for item in rest.split(':') {
            let item = item.trim().trim_end_matches(['?', '!']);
            let Some((proc_name, event_name)) = item.split_once('@') else {
                return self.fail(format!("expected `PROC@EVENT`, got `{}`", item));
            };
            let Some(pid) = self.model.process(proc_name.trim()) else {
                return self.fail(format!("unknown process `{}`", proc_name));
            };
            let Some(event) = self.model.event(event_name.trim()) else {
                return self.fail(format!("unknown event `{}`", event_name));
            };
            vector.push((pid, event));
        }
        if vector.len() < 2 {
            return self.fail("synchronization needs at least two participants");
        }
        self.model.syncs.push(vector);
        Ok(())
    }

    /// Split `HEAD{ATTRS}` into head and attribute text (empty if absent).
    fn split_braces(&self, s: &str) -> Result<(String, String)> {
        match s.split_once('{') {
            None => Ok((s.trim().to_string(), String::new())),
            Some((head, rest)) => {
                let Some(attrs) = rest.strip_suffix('}') else {
                    return self.fail("missing closing `}`");
                };
                Ok((head.trim().to_string(), attrs.trim().to_string()))
            }
        }
    }

    /// Split an attribute block `key: value : key: value` into pairs.
    /// Values never contain colons, so any token that is a known key starts
    /// a new pair and everything else extends the current value.
    fn split_attrs(&self, attrs: &str) -> Result<Vec<(String, String)>> {
        const KEYS: &[&str] = &[
            "initial",
            "invariant",
            "provided",
            "do",
            "labels",
            "committed",
            "urgent",
        ];
        let mut pairs: Vec<(String, String)> = Vec::new();
        if attrs.is_empty() {
            return Ok(pairs);
        }
        for token in attrs.split(':').map(str::trim) {
            if KEYS.contains(&token) {
                pairs.push((token.to_string(), String::new()));
            } else {
                match pairs.last_mut() {
                    Some((_, value)) => {
                        if !value.is_empty() {
                            value.push(':');
                        }
                        value.push_str(token);
                    }
                    None if token.is_empty() => {}
                    None => return self.fail(format!("unexpected attribute text `{}`", token)),
                }
            }
        }
        Ok(pairs)
    }

    fn parse_guards(&self, s: &str) -> Result<Vec<Guard>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Vec::new());
        }
        s.split("&&").map(|atom| self.parse_guard_atom(atom)).collect()
    }

    fn parse_guard_atom(&self, s: &str) -> Result<Guard> {
        const OPS: &[(&str, RelOp)] = &[
            ("==", RelOp::Eq),
            ("!=", RelOp::Ne),
            ("<=", RelOp::Le),
            (">=", RelOp::Ge),
            ("<", RelOp::Lt),
            (">", RelOp::Gt),
        ];
        for (token, op) in OPS {
            if let Some(pos) = s.find(token) {
                let name = s[..pos].trim();
                let val = self.parse_i32(s[pos + token.len()..].trim())?;
                let var = self.resolve_var(name)?;
                if matches!(var, VarRef::Clock(_)) && *op == RelOp::Ne {
                    return self.fail(format!("`!=` is not allowed on clock `{}`", name));
                }
                return Ok(Guard { var, op: *op, val });
            }
        }
        self.fail(format!("cannot parse guard `{}`", s))
    }

    fn parse_updates(&self, s: &str) -> Result<Vec<Update>> {
        let mut updates = Vec::new();
        for stmt in s.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let Some((lhs, rhs)) = stmt.split_once('=') else {
                return self.fail(format!("cannot parse update `{}`", stmt));
            };
            let lhs = lhs.trim();
            let rhs = rhs.trim();
            match self.resolve_var(lhs)? {
                VarRef::Clock(clock) => {
                    let val = self.parse_i32(rhs)?;
                    if val < 0 {
                        return self.fail(format!("clock `{}` reset to a negative value", lhs));
                    }
                    updates.push(Update::Reset { clock, val });
                }
                VarRef::Int(var) => {
                    let expr = self.parse_expr(rhs)?;
                    updates.push(Update::Assign { var, expr });
                }
            }
        }
        Ok(updates)
    }

    /// Sums of terms: `a + 1 - b`. A term is an integer constant or a
    /// variable name.
    fn parse_expr(&self, s: &str) -> Result<IntExpr> {
        let mut terms = Vec::new(); // (sign, text)
        let mut sign = 1;
        let mut cur = String::new();
        for ch in s.chars() {
            match ch {
                '+' | '-' if !cur.trim().is_empty() => {
                    terms.push((sign, std::mem::take(&mut cur)));
                    sign = if ch == '-' { -1 } else { 1 };
                }
                '-' => sign = -sign, // leading or doubled minus
                '+' => {}
                _ => cur.push(ch),
            }
        }
        if !cur.trim().is_empty() {
            terms.push((sign, cur));
        }
        if terms.is_empty() {
            return self.fail(format!("cannot parse expression `{}`", s));
        }

        let mut expr: Option<IntExpr> = None;
        for (sign, text) in terms {
            let text = text.trim();
            let term = if let Ok(c) = text.parse::<i32>() {
                IntExpr::Const(c)
            } else if let Some(v) = self.model.intvar(text) {
                IntExpr::Var(v)
            } else {
                return self.fail(format!("unknown variable `{}` in expression", text));
            };
            expr = Some(match (expr, sign) {
                (None, 1) => term,
                (None, _) => IntExpr::Sub(Box::new(IntExpr::Const(0)), Box::new(term)),
                (Some(e), 1) => IntExpr::Add(Box::new(e), Box::new(term)),
                (Some(e), _) => IntExpr::Sub(Box::new(e), Box::new(term)),
            });
        }
        Ok(expr.expect("terms is non-empty"))
    }

    fn resolve_var(&self, name: &str) -> Result<VarRef> {
        if let Some(c) = self.model.clock(name) {
            Ok(VarRef::Clock(c))
        } else if let Some(v) = self.model.intvar(name) {
            Ok(VarRef::Int(v))
        } else {
            self.fail(format!("unknown clock or variable `{}`", name))
        }
    }

    fn parse_i32(&self, s: &str) -> Result<i32> {
        s.parse::<i32>()
            .or_else(|_| self.fail(format!("cannot parse `{}` as an integer", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOGGLE: &str = "\
system:toggle
event:tau
clock:1:x
int:1:0:5:0:n
process:P
location:P:off{initial:}
location:P:on{invariant: x<=3}
edge:P:off:on:tau{provided: n<5 && x>=1 : do: n=n+1; x=0}
edge:P:on:off:tau{do: x=0}
";

    #[test]
    fn test_parse_toggle() {
        let m = Model::parse(TOGGLE).unwrap();
        assert_eq!(m.name, "toggle");
        assert_eq!(m.processes.len(), 1);
        assert_eq!(m.locations.len(), 2);
        assert_eq!(m.edges.len(), 2);
        assert_eq!(m.clocks.len(), 1);
        assert_eq!(m.intvars.len(), 1);

        let off = m.location(0, "off").unwrap();
        assert!(m.locations[off].initial);
        let on = m.location(0, "on").unwrap();
        assert_eq!(m.locations[on].invariant.len(), 1);

        let e = &m.edges[0];
        assert_eq!(e.guard.len(), 2);
        assert_eq!(e.updates.len(), 2);
        assert_eq!(m.max_clock_constant(), 3);
    }

    #[test]
    fn test_parse_sync() {
        let text = "\
system:s
event:a
process:P
location:P:p0{initial:}
process:Q
location:Q:q0{initial:}
edge:P:p0:p0:a{}
edge:Q:q0:q0:a{}
sync:P@a:Q@a
";
        let m = Model::parse(text).unwrap();
        assert_eq!(m.syncs, vec![vec![(0, 0), (1, 0)]]);
        assert!(m.is_synchronized(0, 0));
        assert!(m.is_synchronized(1, 0));
    }

    #[test]
    fn test_parse_error_carries_line() {
        let text = "system:s\nbogus-line\n";
        match Model::parse(text) {
            Err(Error::ModelLoad { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected ModelLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_location_rejected() {
        let text = "\
system:s
event:a
process:P
location:P:p0{initial:}
edge:P:p0:nowhere:a{}
";
        assert!(matches!(
            Model::parse(text),
            Err(Error::ModelLoad { line: 5, .. })
        ));
    }

    #[test]
    fn test_clock_ne_guard_rejected() {
        let text = "\
system:s
event:a
clock:1:x
process:P
location:P:p0{initial:}
edge:P:p0:p0:a{provided: x!=2}
";
        assert!(Model::parse(text).is_err());
    }

    #[test]
    fn test_dump_info() {
        let m = Model::parse(TOGGLE).unwrap();
        let mut out = String::new();
        m.dump_info(&mut out).unwrap();
        assert!(out.contains("- P.off"));
        assert!(out.contains("- P.on"));
        assert!(out.contains("- n (0..5)"));
    }

    #[test]
    fn test_expr_eval() {
        let m = Model::parse(TOGGLE).unwrap();
        let e = &m.edges[0];
        let assign = e
            .updates
            .iter()
            .find_map(|u| match u {
                Update::Assign { expr, .. } => Some(expr),
                _ => None,
            })
            .unwrap();
        assert_eq!(assign.eval(&[4]), 5); // n = n + 1
    }
}

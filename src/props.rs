//! Compiling atomic propositions against a model.
//!
//! A proposition is either a location membership test `PROC.LOC` or a
//! comparison `VAR op CONST` over a bounded integer variable. A bare
//! variable name abbreviates `VAR != 0`. Compilation resolves every name
//! against the model up front so that evaluation over a configuration is a
//! plain table walk with no lookups.

use crate::dict::VarDict;
use crate::error::{Error, Result};
use crate::model::{Model, RelOp};
use crate::zg::Config;

#[derive(Debug, Clone, PartialEq)]
enum Test {
    /// Process `pid` is at the location with global id `loc`.
    At { pid: usize, loc: usize },
    /// Integer variable `var` compared against a constant.
    Cmp { var: usize, op: RelOp, val: i32 },
}

/// One compiled proposition: the evaluation recipe plus the boolean
/// variable registered for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub name: String,
    pub var: u32,
    test: Test,
}

impl Prop {
    pub fn holds(&self, cfg: &Config) -> bool {
        match self.test {
            Test::At { pid, loc } => cfg.vloc[pid] == loc,
            Test::Cmp { var, op, val } => op.eval(cfg.ints[var], val),
        }
    }
}

/// Compile `names` against `model`, registering one boolean variable per
/// proposition in `dict`. All-or-nothing: if any proposition fails, every
/// registration made so far is undone and all messages are reported in one
/// [`Error::PropositionCompile`].
pub fn compile(names: &[String], model: &Model, dict: &mut VarDict) -> Result<Vec<Prop>> {
    let mut props = Vec::with_capacity(names.len());
    let mut errors = Vec::new();

    for name in names {
        match compile_one(name, model) {
            Ok(test) => props.push(Prop {
                name: name.clone(),
                var: dict.register(name),
                test,
            }),
            Err(msg) => errors.push(msg),
        }
    }

    if errors.is_empty() {
        Ok(props)
    } else {
        for prop in &props {
            dict.unregister(&prop.name);
        }
        Err(Error::PropositionCompile(errors))
    }
}

fn compile_one(text: &str, model: &Model) -> std::result::Result<Test, String> {
    let mut chars = text.chars().peekable();

    // The name part runs up to the first relational operator character;
    // blanks inside it are dropped and the last dot is remembered in case
    // this turns out to be a PROC.LOC proposition.
    let mut name = String::new();
    let mut lastdot = None;
    while let Some(&c) = chars.peek() {
        match c {
            '=' | '<' | '>' | '!' => break,
            ' ' | '\t' => {
                chars.next();
            }
            '.' => {
                lastdot = Some(name.len());
                name.push(c);
                chars.next();
            }
            _ => {
                name.push(c);
                chars.next();
            }
        }
    }
    if name.is_empty() {
        return Err(format!("proposition `{}` cannot be parsed", text));
    }
    let rest: String = chars.collect();

    let Some(var) = model.intvar(&name) else {
        // Not a variable. With a dot it may be PROC.LOC.
        let Some(dot) = lastdot else {
            return Err(format!(
                "no variable or process `{}` found in model (for proposition `{}`)",
                name, text
            ));
        };
        let (proc_name, loc_name) = (&name[..dot], &name[dot + 1..]);
        let Some(pid) = model.process(proc_name) else {
            return Err(format!(
                "no variable or process `{}` found in model (for proposition `{}`)",
                name, text
            ));
        };
        let Some(loc) = model.location(pid, loc_name) else {
            return Err(format!(
                "no location `{}` known for process `{}`",
                loc_name, proc_name
            ));
        };
        if !rest.is_empty() {
            return Err(format!(
                "trailing garbage `{}` at end of proposition `{}`",
                rest, text
            ));
        }
        return Ok(Test::At { pid, loc });
    };

    // A bare variable name abbreviates `!= 0`.
    if rest.is_empty() {
        return Ok(Test::Cmp {
            var,
            op: RelOp::Ne,
            val: 0,
        });
    }

    let (op, tail) = parse_relop(&rest).ok_or_else(|| {
        format!(
            "unexpected `{}` while parsing atomic proposition `{}`",
            rest, text
        )
    })?;
    let tail = tail.trim();

    // Parse a leading integer and reject anything after it.
    let digits = tail
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && c == '-'))
        .count();
    let val: i32 = tail[..digits]
        .parse()
        .map_err(|_| format!("failed to parse `{}` as an integer", tail))?;
    let trailing = tail[digits..].trim();
    if !trailing.is_empty() {
        return Err(format!(
            "unexpected `{}` while parsing atomic proposition `{}`",
            trailing, text
        ));
    }

    Ok(Test::Cmp { var, op, val })
}

fn parse_relop(s: &str) -> Option<(RelOp, &str)> {
    for (token, op) in [
        ("==", RelOp::Eq),
        ("!=", RelOp::Ne),
        ("<=", RelOp::Le),
        (">=", RelOp::Ge),
        ("<", RelOp::Lt),
        (">", RelOp::Gt),
    ] {
        if let Some(tail) = s.strip_prefix(token) {
            return Some((op, tail));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::zone::Dbm;
    use std::rc::Rc;

    fn model() -> Rc<Model> {
        Model::parse(
            "\
system:m
event:tau
int:1:0:10:0:count
process:P
location:P:idle{initial:}
location:P:busy{}
edge:P:idle:busy:tau{}
",
        )
        .unwrap()
    }

    fn config(model: &Model, loc: &str, count: i32) -> Config {
        Config {
            vloc: vec![model.location(0, loc).unwrap()],
            ints: vec![count],
            zone: Dbm::zero(0),
        }
    }

    #[test]
    fn test_location_proposition() {
        let m = model();
        let mut dict = VarDict::new();
        let props = compile(&["P.busy".to_string()], &m, &mut dict).unwrap();
        assert_eq!(props.len(), 1);
        assert!(!props[0].holds(&config(&m, "idle", 0)));
        assert!(props[0].holds(&config(&m, "busy", 0)));
    }

    #[test]
    fn test_comparison_proposition() {
        let m = model();
        let mut dict = VarDict::new();
        let props = compile(&["count >= 3".to_string()], &m, &mut dict).unwrap();
        assert!(!props[0].holds(&config(&m, "idle", 2)));
        assert!(props[0].holds(&config(&m, "idle", 3)));
    }

    #[test]
    fn test_bare_variable_means_nonzero() {
        let m = model();
        let mut dict = VarDict::new();
        let props = compile(&["count".to_string()], &m, &mut dict).unwrap();
        assert!(!props[0].holds(&config(&m, "idle", 0)));
        assert!(props[0].holds(&config(&m, "idle", 5)));
    }

    #[test]
    fn test_failure_is_atomic() {
        let m = model();
        let mut dict = VarDict::new();
        let names = vec![
            "count == 1".to_string(),
            "bogus".to_string(),
            "P.nowhere".to_string(),
        ];
        let err = compile(&names, &m, &mut dict).unwrap_err();
        match err {
            Error::PropositionCompile(msgs) => {
                assert_eq!(msgs.len(), 2);
                assert!(msgs[0].contains("bogus"));
                assert!(msgs[1].contains("nowhere"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // The successful registration of `count == 1` was rolled back.
        assert!(dict.is_empty());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let m = model();
        let mut dict = VarDict::new();
        let err = compile(&["count == 1 junk".to_string()], &m, &mut dict).unwrap_err();
        assert!(err.to_string().contains("junk"));
    }
}

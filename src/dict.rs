//! Proposition-to-variable registry.
//!
//! Binds atomic-proposition names to BDD variable ids for the lifetime of a
//! property-checking run. Registration is counted per name: registering the
//! same name twice yields the same variable, and the id is recycled only
//! once every registration has been paired with an unregistration. This
//! keeps two successive runs from leaking or aliasing variable ids.

use std::collections::HashMap;

use log::debug;

#[derive(Debug, Default)]
pub struct VarDict {
    by_name: HashMap<String, (u32, usize)>,
    by_var: HashMap<u32, String>,
    free: Vec<u32>,
    next: u32,
}

impl VarDict {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_var: HashMap::new(),
            free: Vec::new(),
            next: 1, // variable 0 is reserved by the BDD manager
        }
    }

    /// Register `name`, returning its variable id. Counted: a name
    /// registered `n` times must be unregistered `n` times.
    pub fn register(&mut self, name: &str) -> u32 {
        if let Some((var, count)) = self.by_name.get_mut(name) {
            *count += 1;
            return *var;
        }
        let var = self.free.pop().unwrap_or_else(|| {
            let v = self.next;
            self.next += 1;
            v
        });
        debug!("register `{}` -> {}", name, var);
        self.by_name.insert(name.to_string(), (var, 1));
        self.by_var.insert(var, name.to_string());
        var
    }

    /// Drop one registration of `name`. The id goes back to the free list
    /// when the last registration is released.
    pub fn unregister(&mut self, name: &str) {
        let Some((var, count)) = self.by_name.get_mut(name) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            let var = *var;
            debug!("unregister `{}` (was {})", name, var);
            self.by_name.remove(name);
            self.by_var.remove(&var);
            self.free.push(var);
        }
    }

    pub fn var(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|&(var, _)| var)
    }

    pub fn name(&self, var: u32) -> Option<&str> {
        self.by_var.get(&var).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

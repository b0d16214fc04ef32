/// Counter for generated names: anonymous modules and per-function label
/// prefixes. Owned by whoever drives a compilation, so two sessions in
/// one process never share numbering.
#[derive(Debug, Default, Clone)]
pub struct UniqueIds {
    next: usize,
}

impl UniqueIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }

    /// `module` -> `module_anon_0`, `module_anon_1`, ...
    pub fn anonymous(&mut self, kind: &str) -> String {
        format!("{kind}_anon_{}", self.next_id())
    }

    /// `fib` -> `fib_3`
    pub fn unique(&mut self, base: &str) -> String {
        format!("{base}_{}", self.next_id())
    }
}

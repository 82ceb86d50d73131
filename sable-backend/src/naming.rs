//! Label naming for lowered procedures
//!
//! Every label is prefixed with its procedure name so labels from
//! different procs can never collide in one listing. Within a proc the
//! generator hands out each label once.

use std::collections::HashSet;

#[derive(Debug)]
pub struct NameGenerator {
    proc: String,
    used: HashSet<String>,
    next_diamond: u32,
}

/// Labels of one comparison diamond
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiamondLabels {
    pub on_true: String,
    pub on_false: String,
    pub join: String,
}

impl NameGenerator {
    pub fn new(proc: &str) -> Self {
        Self {
            proc: proc.to_string(),
            used: HashSet::new(),
            next_diamond: 0,
        }
    }

    /// Label holding the frame setup that precedes the entry block
    pub fn prologue_label(&mut self) -> String {
        self.claim(format!("{}.prologue", self.proc))
    }

    /// Label for an IR basic block
    pub fn block_label(&mut self, block: &str) -> String {
        self.claim(format!("{}.{}", self.proc, sanitize(block)))
    }

    pub fn diamond(&mut self) -> DiamondLabels {
        let id = self.next_diamond;
        self.next_diamond += 1;
        let base = format!("{}.cmp{}", self.proc, id);
        DiamondLabels {
            on_true: self.claim(format!("{}_T", base)),
            on_false: self.claim(format!("{}_F", base)),
            join: self.claim(format!("{}_C", base)),
        }
    }

    // Append a counter until the label is unused
    fn claim(&mut self, label: String) -> String {
        let mut candidate = label.clone();
        let mut n = 1;
        while self.used.contains(&candidate) {
            candidate = format!("{}_{}", label, n);
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Restrict a name to characters every assembler accepts in a label
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_labels_are_scoped() {
        let mut naming = NameGenerator::new("fact");
        assert_eq!(naming.block_label("begin"), "fact.begin");
        assert_eq!(naming.block_label("then.1"), "fact.then.1");
        assert_eq!(naming.block_label("end loop"), "fact.end_loop");
    }

    #[test]
    fn test_diamonds_are_unique() {
        let mut naming = NameGenerator::new("f");
        let first = naming.diamond();
        let second = naming.diamond();
        assert_eq!(first.on_true, "f.cmp0_T");
        assert_eq!(first.on_false, "f.cmp0_F");
        assert_eq!(first.join, "f.cmp0_C");
        assert_eq!(second.join, "f.cmp1_C");
    }

    #[test]
    fn test_collisions_get_suffixes() {
        let mut naming = NameGenerator::new("f");
        assert_eq!(naming.block_label("cmp0_T"), "f.cmp0_T");
        assert_eq!(naming.diamond().on_true, "f.cmp0_T_1");
    }
}

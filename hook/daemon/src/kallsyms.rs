//! Kernel symbol resolution
//!
//! Parses /proc/kallsyms to map probe names to the addresses the kernel
//! reports in HookContext::symbol_addr, and back.

use anyhow::{Context, Result};
use std::collections::HashMap;

const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Kernel text symbols
#[derive(Debug, Default)]
pub struct Kallsyms {
    by_name: HashMap<String, u64>,
    /// Sorted by address
    by_addr: Vec<(u64, String)>,
}

impl Kallsyms {
    /// Read the running kernel's symbol table
    ///
    /// Addresses read as zero without CAP_SYSLOG; such entries are skipped.
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string(KALLSYMS_PATH)
            .with_context(|| format!("Failed to read {}", KALLSYMS_PATH))?;
        Ok(Self::parse(&content))
    }

    /// Parse kallsyms-formatted text: `<addr> <type> <name> [module]`
    pub fn parse(content: &str) -> Self {
        let mut by_name = HashMap::new();
        let mut by_addr = Vec::new();

        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let (Some(addr), Some(kind), Some(name)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Ok(addr) = u64::from_str_radix(addr, 16) else {
                continue;
            };
            if addr == 0 || !matches!(kind, "t" | "T" | "w" | "W") {
                continue;
            }

            by_name.entry(name.to_string()).or_insert(addr);
            by_addr.push((addr, name.to_string()));
        }

        by_addr.sort_by_key(|(addr, _)| *addr);

        Self { by_name, by_addr }
    }

    /// Address of a function, first definition wins
    pub fn address_of(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    /// Nearest symbol at or below `addr`, with the offset into it
    pub fn symbolize(&self, addr: u64) -> Option<(&str, u64)> {
        let idx = match self.by_addr.binary_search_by_key(&addr, |(a, _)| *a) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let (base, name) = &self.by_addr[idx];
        Some((name.as_str(), addr - base))
    }

    /// Human readable name for an address: `sym` or `sym+0x10`
    pub fn describe(&self, addr: u64) -> String {
        match self.symbolize(addr) {
            Some((name, 0)) => name.to_string(),
            Some((name, off)) => format!("{}+{:#x}", name, off),
            None => format!("{:#x}", addr),
        }
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ffffffff81000000 T _stext
ffffffff81001000 T do_one_initcall
ffffffff81002000 t helper_local
ffffffff81003000 D some_data
ffffffffc0a01000 t ovs_dp_upcall\t[openvswitch]
ffffffffc0a02000 t ovs_execute_actions\t[openvswitch]
0000000000000000 T hidden_symbol
garbage line
";

    #[test]
    fn test_parse_keeps_text_symbols_only() {
        let syms = Kallsyms::parse(SAMPLE);

        assert_eq!(syms.len(), 5);
        assert_eq!(syms.address_of("do_one_initcall"), Some(0xffffffff81001000));
        assert_eq!(syms.address_of("ovs_dp_upcall"), Some(0xffffffffc0a01000));
        assert_eq!(syms.address_of("some_data"), None);
        assert_eq!(syms.address_of("hidden_symbol"), None);
    }

    #[test]
    fn test_symbolize_nearest_lower_symbol() {
        let syms = Kallsyms::parse(SAMPLE);

        assert_eq!(
            syms.symbolize(0xffffffffc0a01000),
            Some(("ovs_dp_upcall", 0))
        );
        assert_eq!(
            syms.symbolize(0xffffffff81002010),
            Some(("helper_local", 0x10))
        );
        assert_eq!(syms.symbolize(0x1000), None);
    }

    #[test]
    fn test_describe() {
        let syms = Kallsyms::parse(SAMPLE);

        assert_eq!(syms.describe(0xffffffff81001000), "do_one_initcall");
        assert_eq!(syms.describe(0xffffffff81001004), "do_one_initcall+0x4");
        assert_eq!(syms.describe(0x10), "0x10");
    }

    #[test]
    fn test_empty_table() {
        let syms = Kallsyms::parse("");
        assert!(syms.is_empty());
        assert_eq!(syms.symbolize(0xffffffff81000000), None);
    }
}

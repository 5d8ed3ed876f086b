//! Kubernetes resource quantity decoding
//!
//! Turns quantity strings from pod specs (`"250m"`, `"0.5Gi"`, `"2"`) into
//! plain numbers: millicores for CPU, bytes for memory. Both parsers are
//! total: anything they cannot read decodes to zero.

use regex::Regex;
use std::sync::OnceLock;

fn cpu_quantity() -> &'static Regex {
    static CPU_QUANTITY: OnceLock<Regex> = OnceLock::new();
    CPU_QUANTITY.get_or_init(|| Regex::new(r"([0-9.]+)(m)?").expect("cpu quantity pattern"))
}

fn memory_quantity() -> &'static Regex {
    static MEMORY_QUANTITY: OnceLock<Regex> = OnceLock::new();
    MEMORY_QUANTITY.get_or_init(|| {
        Regex::new(r"([0-9.]+)(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|b|k|M|G|T|P|E)?$")
            .expect("memory quantity pattern")
    })
}

/// Memory quantity suffixes with their byte multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySuffix {
    Ki,
    Mi,
    Gi,
    Ti,
    Pi,
    Ei,
    Nano,
    Micro,
    Milli,
    Byte,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Exa,
}

impl MemorySuffix {
    /// Resolve a suffix; unknown or missing suffixes mean plain bytes
    pub fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "Ki" => Self::Ki,
            "Mi" => Self::Mi,
            "Gi" => Self::Gi,
            "Ti" => Self::Ti,
            "Pi" => Self::Pi,
            "Ei" => Self::Ei,
            "n" => Self::Nano,
            "u" => Self::Micro,
            "m" => Self::Milli,
            "k" => Self::Kilo,
            "M" => Self::Mega,
            "G" => Self::Giga,
            "T" => Self::Tera,
            "P" => Self::Peta,
            "E" => Self::Exa,
            _ => Self::Byte,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Ki => (1u64 << 10) as f64,
            Self::Mi => (1u64 << 20) as f64,
            Self::Gi => (1u64 << 30) as f64,
            Self::Ti => (1u64 << 40) as f64,
            Self::Pi => (1u64 << 50) as f64,
            Self::Ei => (1u64 << 60) as f64,
            Self::Nano => 1e-9,
            Self::Micro => 1e-6,
            Self::Milli => 1e-3,
            Self::Byte => 1.0,
            Self::Kilo => 1e3,
            Self::Mega => 1e6,
            Self::Giga => 1e9,
            Self::Tera => 1e12,
            Self::Peta => 1e15,
            Self::Exa => 1e18,
        }
    }

    pub fn to_bytes(&self, value: f64) -> f64 {
        value * self.multiplier()
    }
}

/// Parse a CPU quantity into millicores
///
/// `"250m"` is already millicores, a bare number is cores.
pub fn parse_cpu<'a>(quantity: impl Into<Option<&'a str>>) -> f64 {
    let Some(quantity) = quantity.into().filter(|q| !q.is_empty()) else {
        return 0.0;
    };

    let Some(caps) = cpu_quantity().captures(quantity) else {
        return 0.0;
    };
    let Ok(number) = caps[1].parse::<f64>() else {
        return 0.0;
    };

    if caps.get(2).is_some() {
        number
    } else {
        number * 1000.0
    }
}

/// Parse a memory quantity into bytes
pub fn parse_memory<'a>(quantity: impl Into<Option<&'a str>>) -> f64 {
    let Some(quantity) = quantity.into().filter(|q| !q.is_empty()) else {
        return 0.0;
    };

    let Some(caps) = memory_quantity().captures(quantity) else {
        return 0.0;
    };
    let Ok(number) = caps[1].parse::<f64>() else {
        return 0.0;
    };

    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    MemorySuffix::from_suffix(suffix).to_bytes(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = expected.abs() * 1e-12;
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(parse_cpu("100m"), 100.0);
        assert_eq!(parse_cpu("1000m"), 1000.0);
        assert_eq!(parse_cpu("1"), 1000.0);
        assert_eq!(parse_cpu("2"), 2000.0);
        assert_eq!(parse_cpu("0.5"), 500.0);
    }

    #[test]
    fn test_parse_cpu_unreadable_input_is_zero() {
        assert_eq!(parse_cpu(""), 0.0);
        assert_eq!(parse_cpu(None), 0.0);
        assert_eq!(parse_cpu("w"), 0.0);
        assert_eq!(parse_cpu("1.2.3"), 0.0);
    }

    #[test]
    fn test_parse_memory_binary_suffixes() {
        assert_eq!(parse_memory("1Ki"), 1024.0);
        assert_eq!(parse_memory("1Mi"), 1_048_576.0);
        assert_eq!(parse_memory("1Gi"), 1_073_741_824.0);
        assert_eq!(parse_memory("1Ti"), 1_099_511_627_776.0);
        assert_eq!(parse_memory("1Pi"), 1_125_899_906_842_624.0);
        assert_eq!(parse_memory("1Ei"), 1_152_921_504_606_846_976.0);
        assert_eq!(parse_memory("0.5Mi"), 524_288.0);
        assert_eq!(parse_memory("0.5Gi"), 536_870_912.0);
    }

    #[test]
    fn test_parse_memory_decimal_suffixes() {
        assert_eq!(parse_memory("1b"), 1.0);
        assert_eq!(parse_memory("1k"), 1000.0);
        assert_eq!(parse_memory("1M"), 1_000_000.0);
        assert_eq!(parse_memory("1G"), 1e9);
        assert_eq!(parse_memory("1T"), 1e12);
        assert_eq!(parse_memory("1P"), 1e15);
        assert_eq!(parse_memory("1E"), 1e18);
        assert_close(parse_memory("1n"), 1e-9);
        assert_close(parse_memory("1u"), 1e-6);
        assert_close(parse_memory("1m"), 1e-3);
        assert_close(parse_memory("1000000000n"), 1.0);
        assert_close(parse_memory("1000000u"), 1.0);
        assert_close(parse_memory("1000m"), 1.0);
    }

    #[test]
    fn test_parse_memory_without_suffix_is_bytes() {
        assert_eq!(parse_memory("1024"), 1024.0);
    }

    #[test]
    fn test_parse_memory_unreadable_input_is_zero() {
        assert_eq!(parse_memory(""), 0.0);
        assert_eq!(parse_memory(None), 0.0);
        assert_eq!(parse_memory("w"), 0.0);
        assert_eq!(parse_memory("1Gx"), 0.0);
    }

    #[test]
    fn test_memory_suffix_fallback() {
        assert_eq!(MemorySuffix::from_suffix("Zi"), MemorySuffix::Byte);
        assert_eq!(MemorySuffix::from_suffix(""), MemorySuffix::Byte);
    }
}

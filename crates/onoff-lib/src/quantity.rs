//! Kubernetes resource quantity parsing
//!
//! Quantities are `<integer><suffix>` strings such as `700Mi` or `250m`.
//! Only the suffixes reported by the pod metrics API and commonly used in
//! container limits are recognised.

use crate::error::{OnOffError, Result};

const CPU_SUFFIXES: &[(&str, f64)] = &[("", 1.0), ("n", 1e-9), ("u", 1e-6), ("m", 1e-3)];

/// Split a quantity into its integer magnitude and unit suffix.
fn split_quantity(quantity: &str) -> Result<(u64, &str)> {
    let digits = quantity
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(quantity.len());
    if digits == 0 {
        return Err(OnOffError::MalformedQuantity(quantity.to_string()));
    }
    let magnitude = quantity[..digits]
        .parse::<u64>()
        .map_err(|_| OnOffError::MalformedQuantity(quantity.to_string()))?;
    Ok((magnitude, &quantity[digits..]))
}

fn unknown_suffix(quantity: &str, suffix: &str) -> OnOffError {
    OnOffError::UnknownUnitSuffix {
        quantity: quantity.to_string(),
        suffix: suffix.to_string(),
    }
}

/// Parse a memory quantity, like `700Mi`, into a number of bytes.
pub fn parse_memory(quantity: &str) -> Result<u64> {
    let (magnitude, suffix) = split_quantity(quantity)?;
    let bytes = match suffix {
        "" => Some(magnitude),
        "Ki" => magnitude.checked_mul(1 << 10),
        "Mi" => magnitude.checked_mul(1 << 20),
        "Gi" => magnitude.checked_mul(1 << 30),
        // milli-bytes, truncated to whole bytes
        "m" => Some(magnitude / 1000),
        _ => return Err(unknown_suffix(quantity, suffix)),
    };
    bytes.ok_or_else(|| OnOffError::MalformedQuantity(quantity.to_string()))
}

/// Parse a CPU quantity, like `500m`, into a (fractional) number of cores.
pub fn parse_cpu(quantity: &str) -> Result<f64> {
    let (magnitude, suffix) = split_quantity(quantity)?;
    let factor = CPU_SUFFIXES
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, f)| *f)
        .ok_or_else(|| unknown_suffix(quantity, suffix))?;
    Ok(magnitude as f64 * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_binary_suffixes() {
        assert_eq!(parse_memory("700Mi").unwrap(), 734_003_200);
        assert_eq!(parse_memory("1Gi").unwrap(), 1_073_741_824);
        assert_eq!(parse_memory("64Ki").unwrap(), 65_536);
        assert_eq!(parse_memory("1234").unwrap(), 1234);
    }

    #[test]
    fn test_parse_memory_milli_truncates() {
        assert_eq!(parse_memory("1500m").unwrap(), 1);
        assert_eq!(parse_memory("999m").unwrap(), 0);
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(parse_cpu("500m").unwrap(), 0.5);
        assert_eq!(parse_cpu("2").unwrap(), 2.0);
        assert!((parse_cpu("100n").unwrap() - 1e-7).abs() < 1e-18);
        assert!((parse_cpu("250u").unwrap() - 2.5e-4).abs() < 1e-15);
    }

    #[test]
    fn test_unknown_suffix() {
        assert!(matches!(
            parse_memory("5Xy"),
            Err(OnOffError::UnknownUnitSuffix { ref suffix, .. }) if suffix == "Xy"
        ));
        // CPU has no binary prefixes
        assert!(matches!(
            parse_cpu("1Gi"),
            Err(OnOffError::UnknownUnitSuffix { .. })
        ));
    }

    #[test]
    fn test_malformed_quantity() {
        assert!(matches!(
            parse_memory("abc"),
            Err(OnOffError::MalformedQuantity(_))
        ));
        assert!(matches!(parse_cpu(""), Err(OnOffError::MalformedQuantity(_))));
        assert!(matches!(
            parse_memory("99999999999999999999Gi"),
            Err(OnOffError::MalformedQuantity(_))
        ));
    }

    #[test]
    fn test_decimal_limit_is_not_a_known_suffix() {
        // "0.5" splits into magnitude 0 and suffix ".5"
        assert!(matches!(
            parse_cpu("0.5"),
            Err(OnOffError::UnknownUnitSuffix { .. })
        ));
    }
}

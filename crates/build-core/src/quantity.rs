//! Exact parsing of Kubernetes resource quantities (`500m`, `1.5Gi`, `2e3`).
//!
//! Builder images receive limits as plain numbers, so the textual form users
//! write has to be resolved first.

use std::str::FromStr;

use crate::error::CoreError;

/// Largest power of ten a quantity may carry either way. Limits far outside
/// this range are typos and would render as absurdly long numbers.
const MAX_SCALE: i32 = 40;

/// `mantissa * 10^scale`, normalized so the mantissa carries no trailing zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: i128,
    scale: i32,
}

impl FromStr for ParsedQuantity {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidQuantity(raw.to_string());
        let s = raw.trim();

        let (negative, s) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(number_len);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for digit in whole.chars().chain(fraction.chars()) {
            let d = digit.to_digit(10).ok_or_else(invalid)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(d as i128))
                .ok_or_else(invalid)?;
        }
        let mut scale = -(fraction.len() as i32);

        match suffix {
            "" => {}
            "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
                let power = match suffix {
                    "Ki" => 1,
                    "Mi" => 2,
                    "Gi" => 3,
                    "Ti" => 4,
                    "Pi" => 5,
                    _ => 6,
                };
                mantissa = mantissa
                    .checked_mul(1i128 << (10 * power))
                    .ok_or_else(invalid)?;
            }
            "n" => scale -= 9,
            "u" => scale -= 6,
            "m" => scale -= 3,
            "k" => scale += 3,
            "M" => scale += 6,
            "G" => scale += 9,
            "T" => scale += 12,
            "P" => scale += 15,
            "E" => scale += 18,
            _ if suffix.starts_with(['e', 'E']) => {
                let exponent: i32 = suffix[1..].parse().map_err(|_| invalid())?;
                scale = scale.checked_add(exponent).ok_or_else(invalid)?;
            }
            _ => return Err(invalid()),
        }

        if negative {
            mantissa = -mantissa;
        }

        let parsed = Self::normalized(mantissa, scale);
        if parsed.scale.abs() > MAX_SCALE {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

impl ParsedQuantity {
    fn normalized(mut mantissa: i128, mut scale: i32) -> Self {
        if mantissa == 0 {
            return Self { mantissa, scale: 0 };
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            scale += 1;
        }
        Self { mantissa, scale }
    }

    /// The exact integer value, if the quantity has no fractional part and fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.scale < 0 {
            return None;
        }
        let factor = 10i128.checked_pow(self.scale as u32)?;
        let value = self.mantissa.checked_mul(factor)?;
        i64::try_from(value).ok()
    }

    /// Plain decimal rendering without exponent or suffix (`1.5`, `1048576`).
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();

        if self.scale >= 0 {
            return format!("{sign}{digits}{}", "0".repeat(self.scale as usize));
        }

        let fraction_len = self.scale.unsigned_abs() as usize;
        let padded = if digits.len() <= fraction_len {
            format!("{}{}", "0".repeat(fraction_len - digits.len() + 1), digits)
        } else {
            digits
        };
        let (whole, fraction) = padded.split_at(padded.len() - fraction_len);
        format!("{sign}{whole}.{fraction}")
    }

    /// Memory in bytes, falling back to the decimal form when it is not a whole number.
    pub fn to_bytes_string(&self) -> String {
        self.to_i64()
            .map(|bytes| bytes.to_string())
            .unwrap_or_else(|| self.to_decimal_string())
    }

    /// Canonical CPU form: whole cores as integers, otherwise the smallest of `m`, `u`, `n`.
    pub fn to_cpu_string(&self) -> String {
        if self.scale >= 0 {
            return self.to_decimal_string();
        }
        for (suffix, shift) in [("m", 3), ("u", 6), ("n", 9)] {
            if self.scale + shift >= 0 {
                let scaled = Self::normalized(self.mantissa, self.scale + shift);
                return format!("{}{suffix}", scaled.to_decimal_string());
            }
        }
        self.to_decimal_string()
    }
}

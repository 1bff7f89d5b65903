//! Specification (value + unit) extraction against a closed unit taxonomy.

use crate::core::SpecValue;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parameter types in the closed unit taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ParamType {
    Area,
    Temperature,
    Frequency,
    Resistance,
    Percentage,
    Voltage,
    Current,
    Power,
    Length,
}

impl ParamType {
    /// Extraction order: more specific units first so that e.g. `mm²`
    /// claims its span before the bare `mm` length pattern can.
    pub const ALL: [Self; 9] = [
        Self::Area,
        Self::Temperature,
        Self::Frequency,
        Self::Resistance,
        Self::Percentage,
        Self::Voltage,
        Self::Current,
        Self::Power,
        Self::Length,
    ];

    /// Snake-case name used in payloads and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Temperature => "temperature",
            Self::Frequency => "frequency",
            Self::Resistance => "resistance",
            Self::Percentage => "percentage",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Power => "power",
            Self::Length => "length",
        }
    }

    /// Base unit values of this type are reported in.
    #[must_use]
    pub const fn base_unit(self) -> &'static str {
        match self {
            Self::Area => "mm²",
            Self::Temperature => "°C",
            Self::Frequency => "Hz",
            Self::Resistance => "Ω",
            Self::Percentage => "%",
            Self::Voltage => "V",
            Self::Current => "A",
            Self::Power => "W",
            Self::Length => "m",
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Self::Area => r"(\d+(?:\.\d+)?)\s*(mm²|mm2|sq\.?\s*mm)",
            Self::Temperature => r"(\d+(?:\.\d+)?)\s*(°C|°F|K)\b",
            Self::Frequency => r"(\d+(?:\.\d+)?)\s*(kHz|MHz|Hz)\b",
            // Adjacent text resolves Ω vs ohm spelling
            Self::Resistance => r"(\d+(?:\.\d+)?)\s*(Ω|ohms?)\b",
            Self::Percentage => r"(\d+(?:\.\d+)?)\s*(%)",
            Self::Voltage => r"(\d+(?:\.\d+)?)\s*(kV|mV|V|volts?)\b",
            Self::Current => r"(\d+(?:\.\d+)?)\s*(kA|mA|A|amps?)\b",
            Self::Power => r"(\d+(?:\.\d+)?)\s*(kW|MW|W|watts?)\b",
            Self::Length => r"(\d+(?:\.\d+)?)\s*(mm|cm|km|m)\b",
        }
    }
}

/// A specification match with position and surrounding context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecRef {
    /// Parameter type.
    pub param_type: ParamType,
    /// Numeric value as written.
    pub value: f64,
    /// Unit as written.
    pub unit: String,
    /// Byte span of the full match.
    pub span: (usize, usize),
    /// Up to ±50 bytes of surrounding text, newlines flattened.
    pub context: String,
}

impl SpecRef {
    /// Converts to the payload form.
    #[must_use]
    pub fn to_spec_value(&self) -> SpecValue {
        SpecValue {
            param_type: self.param_type.as_str().to_string(),
            value: self.value,
            unit: self.unit.clone(),
        }
    }
}

/// Specification extractor over the closed unit taxonomy.
#[derive(Debug)]
pub struct SpecExtractor {
    patterns: Vec<(ParamType, Regex)>,
}

impl Default for SpecExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecExtractor {
    /// Compiles the taxonomy patterns.
    #[must_use]
    pub fn new() -> Self {
        let patterns = ParamType::ALL
            .iter()
            .filter_map(|&p| Regex::new(p.pattern()).ok().map(|re| (p, re)))
            .collect();
        Self { patterns }
    }

    /// Extracts all specification values, ordered by position.
    ///
    /// Spans are claimed in taxonomy order so that a value matched by a
    /// more specific unit (`2.5 mm²` as area) is not re-reported by a
    /// looser one (`2.5 mm` as length).
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<SpecRef> {
        let mut specs: Vec<SpecRef> = Vec::new();
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for (param_type, re) in &self.patterns {
            for caps in re.captures_iter(text) {
                let Some(full) = caps.get(0) else { continue };
                let overlap = claimed
                    .iter()
                    .any(|&(s, e)| full.start() < e && s < full.end());
                if overlap {
                    continue;
                }
                let Some(value) = caps.get(1).and_then(|v| v.as_str().parse::<f64>().ok()) else {
                    continue;
                };
                let unit = caps.get(2).map_or("", |u| u.as_str()).to_string();

                let ctx_start = crate::core::find_char_boundary(text, full.start().saturating_sub(50));
                let ctx_end =
                    crate::core::find_char_boundary(text, (full.end() + 50).min(text.len()));
                let context = text[ctx_start..ctx_end].replace('\n', " ").trim().to_string();

                claimed.push((full.start(), full.end()));
                specs.push(SpecRef {
                    param_type: *param_type,
                    value,
                    unit,
                    span: (full.start(), full.end()),
                    context,
                });
            }
        }

        specs.sort_by_key(|s| s.span.0);
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_extract_area_not_length() {
        let extractor = SpecExtractor::new();
        let specs = extractor.extract("The minimum conductor size is 2.5 mm² for power circuits.");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].param_type, ParamType::Area);
        assert!((specs[0].value - 2.5).abs() < f64::EPSILON);
        assert_eq!(specs[0].unit, "mm²");
    }

    #[test_case("rated for 230 V", ParamType::Voltage, 230.0; "voltage")]
    #[test_case("current of 16 A", ParamType::Current, 16.0; "current")]
    #[test_case("power up to 3 kW", ParamType::Power, 3.0; "power")]
    #[test_case("at 50 Hz supply", ParamType::Frequency, 50.0; "frequency")]
    #[test_case("drop below 4 %", ParamType::Percentage, 4.0; "percentage")]
    #[test_case("ambient of 30 °C", ParamType::Temperature, 30.0; "temperature")]
    #[test_case("earth loop of 0.35 Ω", ParamType::Resistance, 0.35; "resistance unicode")]
    #[test_case("resistance of 2 ohms", ParamType::Resistance, 2.0; "resistance spelt")]
    fn test_extract_single(text: &str, expected: ParamType, value: f64) {
        let extractor = SpecExtractor::new();
        let specs = extractor.extract(text);
        assert_eq!(specs.len(), 1, "{text}");
        assert_eq!(specs[0].param_type, expected);
        assert!((specs[0].value - value).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extract_multiple_sorted() {
        let extractor = SpecExtractor::new();
        let specs = extractor.extract("Use 2.5 mm² cable rated 20 A at 230 V.");
        let types: Vec<ParamType> = specs.iter().map(|s| s.param_type).collect();
        assert_eq!(
            types,
            vec![ParamType::Area, ParamType::Current, ParamType::Voltage]
        );
    }

    #[test]
    fn test_extract_context_window() {
        let extractor = SpecExtractor::new();
        let specs = extractor.extract("The maximum voltage drop shall not exceed 4 % of nominal.");
        assert_eq!(specs.len(), 1);
        assert!(specs[0].context.contains("voltage drop"));
    }

    #[test]
    fn test_extract_empty() {
        let extractor = SpecExtractor::new();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract("no values at all").is_empty());
    }

    #[test]
    fn test_to_spec_value() {
        let extractor = SpecExtractor::new();
        let specs = extractor.extract("size 4 mm2");
        let value = specs[0].to_spec_value();
        assert_eq!(value.param_type, "area");
        assert_eq!(value.unit, "mm2");
    }

    #[test]
    fn test_base_units() {
        assert_eq!(ParamType::Area.base_unit(), "mm²");
        assert_eq!(ParamType::Resistance.base_unit(), "Ω");
        assert_eq!(ParamType::Length.base_unit(), "m");
    }
}

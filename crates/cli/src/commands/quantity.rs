//! `quantity`: run the quantity codec by hand

use anyhow::{Context, Result};
use rightsizer_lib::quantity::{format_quantity, parse_quantity};
use rightsizer_lib::Resource;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::output::{print_json, OutputFormat};

/// Base-unit value rendered the way a patch would carry it
pub fn format_value(value: &str, resource: Resource, suffix: Option<&str>) -> Result<String> {
    let value = Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .with_context(|| format!("{:?} is not a decimal number", value))?;
    let suffix = suffix.unwrap_or_else(|| resource.patch_suffix());
    Ok(format_quantity(value, suffix)?)
}

/// Quantity string converted to base units (cores or bytes)
pub fn parse_value(quantity: &str) -> Result<Decimal> {
    Ok(parse_quantity(quantity)?.normalize())
}

pub fn show_format(
    value: &str,
    resource: Resource,
    suffix: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let formatted = format_value(value, resource, suffix)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "value": value,
            "resource": resource,
            "quantity": formatted,
        })),
        OutputFormat::Table => {
            println!("{}", formatted);
            Ok(())
        }
    }
}

pub fn show_parse(quantity: &str, format: OutputFormat) -> Result<()> {
    let value = parse_value(quantity)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "quantity": quantity,
            "value": value.to_string(),
        })),
        OutputFormat::Table => {
            println!("{}", value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value_uses_patch_suffix() {
        assert_eq!(format_value("0.32", Resource::Cpu, None).unwrap(), "320m");
        assert_eq!(
            format_value("73401320", Resource::Memory, None).unwrap(),
            "70Mi"
        );
        assert_eq!(
            format_value("2147483648", Resource::Memory, Some("Gi")).unwrap(),
            "2Gi"
        );
    }

    #[test]
    fn test_format_value_rejects_garbage() {
        assert!(format_value("lots", Resource::Cpu, None).is_err());
        assert!(format_value("1", Resource::Cpu, Some("ki")).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("320m").unwrap().to_string(), "0.32");
        assert_eq!(parse_value("70Mi").unwrap().to_string(), "73400320");
        assert!(parse_value("12xyz").is_err());
    }
}

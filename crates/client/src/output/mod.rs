//! Output formatting functions.

pub mod pretty;

use serde::Serialize;

use crate::cli::OutputFormat;

/// Render `value` as a JSON line, or with `pretty` for human output.
pub fn render<T, F>(value: &T, format: OutputFormat, pretty: F) -> String
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => serde_json::to_string(value).unwrap_or_default(),
        OutputFormat::Pretty => pretty(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slawatch_core::models::Tenant;

    #[test]
    fn test_render_json_ignores_pretty() {
        let tenants = vec![Tenant::new(1, "Acme")];
        let output = render(tenants.as_slice(), OutputFormat::Json, |_| {
            unreachable!("pretty formatter used for json")
        });
        assert_eq!(output, r#"[{"id":1,"name":"Acme","isActive":true}]"#);
    }

    #[test]
    fn test_render_pretty() {
        let tenants: Vec<Tenant> = Vec::new();
        let output = render(tenants.as_slice(), OutputFormat::Pretty, pretty::format_tenants);
        assert_eq!(output, "No tenants found.");
    }
}

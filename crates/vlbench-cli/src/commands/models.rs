//! `vlbench models` command implementation

use crate::error::CliError;
use comfy_table::{ContentArrangement, Table};
use vlbench_foundation::AdapterRegistry;

/// Execute the `vlbench models` command
pub fn run(json: bool) -> Result<(), CliError> {
    let registry = AdapterRegistry::builtin();

    if json {
        let rows: Vec<serde_json::Value> = registry
            .specs()
            .map(|spec| {
                serde_json::json!({
                    "identifier": spec.identifier,
                    "adapter": spec.adapter_name(),
                    "backend": spec.backend_kind().to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Identifier", "Adapter", "Backend"]);
    for spec in registry.specs() {
        table.add_row(vec![
            spec.identifier.to_string(),
            spec.adapter_name().to_string(),
            spec.backend_kind().to_string(),
        ]);
    }
    println!("{table}");
    println!("{} models", registry.len());
    Ok(())
}

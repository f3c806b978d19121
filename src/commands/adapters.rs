//! Adapter listing.

use anyhow::Result;
use digest_hub::adapter::AdapterRegistry;
use digest_hub::source::SourceKind;

use super::print_json;

pub fn run_adapters_command(adapters: &AdapterRegistry, json: bool) -> Result<()> {
    let adapters = adapters.list();
    if json {
        return print_json(&adapters);
    }
    for info in &adapters {
        let kinds: Vec<&str> = info.supported_kinds.iter().map(SourceKind::as_str).collect();
        println!("{}  {}", info.id, info.name);
        if !info.description.is_empty() {
            println!("    {}", info.description);
        }
        println!("    kinds: {}", kinds.join(", "));
        println!("    required config: {}", info.required_config.join(", "));
    }
    Ok(())
}

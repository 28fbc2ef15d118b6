//! Format listing and detection command handlers.

use atomio::io::{FormatDescriptor, ResourceReader, global_exporter_registry, global_format_registry};
use atomio::{AtomioConfig, Location, Result};

/// Lists registered importers and exporters.
pub fn cmd_formats(json: bool) -> Result<()> {
    let importers = global_format_registry().formats();
    let exporters = global_exporter_registry().formats();

    if json {
        let listing = serde_json::json!({ "import": importers, "export": exporters });
        println!("{listing:#}");
        return Ok(());
    }

    println!("Import formats:");
    print_descriptors(&importers);
    println!();
    println!("Export formats:");
    print_descriptors(&exporters);
    Ok(())
}

fn print_descriptors(descriptors: &[FormatDescriptor]) {
    for descriptor in descriptors {
        let extensions = descriptor
            .extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<12} {} ({extensions})",
            descriptor.name, descriptor.description
        );
    }
}

/// Detects the format of a location.
pub fn cmd_detect(config: &AtomioConfig, location: &str) -> Result<()> {
    let location = Location::parse(location)?;
    let reader = ResourceReader::from_config(config);
    match global_format_registry().detect(&location, &reader)? {
        Some(descriptor) => println!("{}: {}", location, descriptor.name),
        None => println!("{location}: unknown format"),
    }
    Ok(())
}

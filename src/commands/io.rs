//! Import and convert command handlers.

use super::{open_dataset, parse_options};
use atomio::models::DataCollection;
use atomio::{AtomioConfig, ExportService, ImportService, NodeRef, Result, TimePoint};

/// Executes the import command.
pub fn cmd_import(
    config: &AtomioConfig,
    location: &str,
    options: &[String],
    frame: Option<TimePoint>,
    json: bool,
) -> Result<()> {
    let options = parse_options(options)?;
    let dataset = open_dataset(config)?;
    if let Some(frame) = frame {
        dataset.set_current_time(frame);
    }

    let node = ImportService::new(&dataset).import_file(location, &options)?;
    let data = node.source().data(dataset.current_time())?;

    if json {
        let dump = serde_json::to_string_pretty(&data)
            .map_err(|e| atomio::Error::operation("serialize_data", e))?;
        println!("{dump}");
        return Ok(());
    }
    print_summary(&node, &data);
    Ok(())
}

/// Executes the convert command: import one file, export it in another format.
#[allow(clippy::too_many_arguments)]
pub fn cmd_convert(
    config: &AtomioConfig,
    input: &str,
    output: &str,
    format: &str,
    import_options: &[String],
    export_options: &[String],
    frame: Option<TimePoint>,
) -> Result<()> {
    let import_options = parse_options(import_options)?;
    let export_options = parse_options(export_options)?;
    let dataset = open_dataset(config)?;
    if let Some(frame) = frame {
        dataset.set_current_time(frame);
    }

    let node = ImportService::new(&dataset).import_file(input, &import_options)?;
    ExportService::new(&dataset).export_file(
        std::slice::from_ref(&node),
        output,
        format,
        &export_options,
    )?;

    println!("Converted {input} -> {output} ({format})");
    Ok(())
}

fn print_summary(node: &NodeRef, data: &DataCollection) {
    let source = node.source();
    println!("Imported: {}", node.name());
    println!("  Frames:     {}", source.num_frames());
    if let Some(frame) = source.loaded_frame() {
        println!("  Frame:      {frame}");
    }
    println!("  Particles:  {}", data.particle_count());
    println!("  Status:     {}", data.status());
    if !data.properties().is_empty() {
        println!("  Properties:");
        for property in data.properties() {
            if property.components.is_empty() {
                println!("    - {}", property.name);
            } else {
                println!("    - {} ({})", property.name, property.components.join(", "));
            }
        }
    }
    if let Some(cell) = &data.cell {
        println!("  Cell:");
        for (label, vector) in ["a", "b", "c"].iter().zip(cell.vectors) {
            println!("    {label} = [{}, {}, {}]", vector[0], vector[1], vector[2]);
        }
        println!(
            "    origin = [{}, {}, {}]",
            cell.origin[0], cell.origin[1], cell.origin[2]
        );
    }
}

//! Command handlers module.
//!
//! - `formats.rs`: registry listing and format detection
//! - `io.rs`: import and convert

mod formats;
mod io;

pub use formats::{cmd_detect, cmd_formats};
pub use io::{cmd_convert, cmd_import};

use atomio::models::{OptionMap, parse_option_assignment};
use atomio::{AtomioConfig, DataSet, Error, Result};

/// Creates the dataset for a command and routes Ctrl-C to its running tasks.
pub fn open_dataset(config: &AtomioConfig) -> Result<DataSet> {
    let dataset = DataSet::from_config(config)?;
    let tasks = dataset.task_manager();
    ctrlc::set_handler(move || {
        let canceled = tasks.cancel_all();
        tracing::info!(canceled, "Interrupted; canceling running operations");
    })
    .map_err(|e| Error::operation("install_signal_handler", e))?;
    Ok(dataset)
}

/// Collects `key=value` arguments into an option map; later keys win.
pub fn parse_options(assignments: &[String]) -> Result<OptionMap> {
    assignments
        .iter()
        .map(|a| parse_option_assignment(a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_options() {
        let options = parse_options(&[
            "multiple_frames=true".to_string(),
            r#"columns=["Position.X",null]"#.to_string(),
        ])
        .unwrap();
        assert_eq!(options["multiple_frames"], json!(true));
        assert_eq!(options["columns"], json!(["Position.X", null]));
        assert!(parse_options(&["novalue".to_string()]).is_err());
    }
}

//! Integration tests for the import and export services.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    clippy::doc_markdown
)]

mod support;

use atomio::io::formats::xyz::XyzExporter;
use atomio::{
    DataSet, Error, ExportService, FileSource, ImportMode, ImportService, Location, ObjectNode,
    OptionMap, StatusType,
};
use serde_json::json;
use std::sync::Arc;
use support::{
    LAMMPS_DUMP, XYZ_MALFORMED, XYZ_SINGLE, XYZ_TWO_FRAMES, cancel_when_running,
    dataset_with_slow_format, id_columns, options, write_file,
};

#[test]
fn test_import_xyz_with_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();

    let node = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();

    let data = node.source().data(dataset.current_time()).unwrap();
    assert_eq!(data.status().status_type(), StatusType::Ok);
    assert_eq!(data.particle_count(), 3);
    assert_eq!(data.column_value(2, "Particle Identifier"), Some(3.0));
    assert_eq!(data.column_value(1, "Position.X"), Some(0.757));
    assert_eq!(node.name(), "a.xyz");
    assert_eq!(dataset.scene().len(), 1);
}

#[test]
fn test_unsupported_format_creates_no_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", "hello world\nnot a structure\n");
    let dataset = DataSet::new().unwrap();

    let err = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &OptionMap::new())
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedFormat { .. }));
    assert!(dataset.scene().is_empty());
}

#[test]
fn test_unknown_option_rejected_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();

    let err = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &options(&[("colums", id_columns())]))
        .unwrap_err();

    match err {
        Error::UnknownOption { name, .. } => assert_eq!(name, "colums"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(dataset.scene().is_empty());
    assert_eq!(dataset.task_manager().active_count(), 0);
}

#[test]
fn test_invalid_option_value_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();

    let err = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &options(&[("multiple_frames", json!("yes"))]))
        .unwrap_err();

    assert!(matches!(err, Error::InvalidOptionValue { .. }));
    assert!(dataset.scene().is_empty());
}

#[test]
fn test_failed_import_keeps_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "bad.xyz", XYZ_MALFORMED);
    let dataset = DataSet::new().unwrap();

    let err = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &OptionMap::new())
        .unwrap_err();

    assert!(matches!(err, Error::ImportFailed(_)), "{err}");
    assert_eq!(dataset.scene().len(), 1);
    let node = dataset.scene().nodes().remove(0);
    assert_eq!(node.source().status().status_type(), StatusType::Error);
}

#[test]
fn test_canceled_import_removes_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "never.slow", "SLOW\n");
    let dataset = dataset_with_slow_format();
    let canceler = cancel_when_running(dataset.task_manager());

    let err = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &OptionMap::new())
        .unwrap_err();

    assert!(canceler.join().unwrap());
    assert!(matches!(err, Error::Canceled));
    assert!(dataset.scene().is_empty());
}

#[test]
fn test_import_multiple_frames_at_current_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "traj.xyz", XYZ_TWO_FRAMES);
    let dataset = DataSet::new().unwrap();
    dataset.set_current_time(1);

    let node = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &options(&[("multiple_frames", json!(true))]))
        .unwrap();

    assert_eq!(node.source().num_frames(), 2);
    assert_eq!(node.source().loaded_frame(), Some(1));
    let data = node.source().data(1).unwrap();
    assert_eq!(data.column_value(0, "Position.X"), Some(0.5));
    assert_eq!(dataset.animation().interval(), (0, 1));
}

#[test]
fn test_replace_selected_reuses_node() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let second = write_file(dir.path(), "b.dump", LAMMPS_DUMP);
    let dataset = DataSet::new().unwrap();
    let service = ImportService::new(&dataset);

    let node = service
        .import_file(first.to_str().unwrap(), &OptionMap::new())
        .unwrap();
    let replaced = service
        .import_location(&Location::local(&second), &OptionMap::new(), ImportMode::ReplaceSelected)
        .unwrap();

    assert_eq!(node.id(), replaced.id());
    assert_eq!(dataset.scene().len(), 1);
    assert_eq!(replaced.source().source_path(), Some(Location::local(&second)));
    assert_eq!(replaced.source().importer().unwrap().format_name().unwrap(), "lammps_dump");
    assert_eq!(replaced.source().data(0).unwrap().particle_count(), 2);
}

#[test]
fn test_reset_scene_replaces_all_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();
    let service = ImportService::new(&dataset);
    let location = Location::local(&path);

    service
        .import_location(&location, &OptionMap::new(), ImportMode::AddToScene)
        .unwrap();
    service
        .import_location(&location, &OptionMap::new(), ImportMode::AddToScene)
        .unwrap();
    assert_eq!(dataset.scene().len(), 2);

    let node = service
        .import_location(&location, &OptionMap::new(), ImportMode::ResetScene)
        .unwrap();
    assert_eq!(dataset.scene().len(), 1);
    assert_eq!(dataset.scene().selected_node().unwrap().id(), node.id());
}

#[test]
fn test_convert_xyz_to_lammps_dump() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let output = dir.path().join("out.dump");
    let dataset = DataSet::new().unwrap();

    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();
    ExportService::new(&dataset)
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "lammps_dump",
            &options(&[("columns", id_columns())]),
        )
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("ITEM: TIMESTEP"));
    assert!(written.contains("ITEM: NUMBER OF ATOMS\n3\n"));

    let reimported = ImportService::new(&dataset)
        .import_file(output.to_str().unwrap(), &OptionMap::new())
        .unwrap();
    let data = reimported.source().data(0).unwrap();
    assert_eq!(data.particle_count(), 3);
    assert_eq!(data.column_value(1, "Position.Y"), Some(0.586));
}

#[test]
fn test_export_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &OptionMap::new())
        .unwrap();

    let err = ExportService::new(&dataset)
        .export_file(&[node], "out.pdb", "pdb", &OptionMap::new())
        .unwrap_err();

    assert!(matches!(err, Error::UnknownFormat(name) if name == "pdb"));
}

#[test]
fn test_export_rejects_bad_options() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let output = dir.path().join("out.xyz");
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &OptionMap::new())
        .unwrap();
    let service = ExportService::new(&dataset);

    let missing = service
        .export_file(&[Arc::clone(&node)], output.to_str().unwrap(), "xyz", &OptionMap::new())
        .unwrap_err();
    let unknown = service
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Position.X"])), ("precision", json!(3))]),
        )
        .unwrap_err();

    assert!(matches!(missing, Error::InvalidExportOptions(_)));
    assert!(matches!(unknown, Error::InvalidExportOptions(_)));
    assert!(!output.exists());
}

#[test]
fn test_export_of_failed_node_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "bad.xyz", XYZ_MALFORMED);
    let output = dir.path().join("out.xyz");
    let dataset = DataSet::new().unwrap();
    let _ = ImportService::new(&dataset).import_file(input.to_str().unwrap(), &OptionMap::new());
    let node = dataset.scene().nodes().remove(0);

    let err = ExportService::new(&dataset)
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Position.X"]))]),
        )
        .unwrap_err();

    assert!(matches!(err, Error::ExportFailed(_)));
}

#[test]
fn test_export_missing_property_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let output = dir.path().join("out.xyz");
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();

    let err = ExportService::new(&dataset)
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Velocity.X"]))]),
        )
        .unwrap_err();

    assert!(matches!(err, Error::ExportFailed(_)), "{err}");
}

#[test]
fn test_export_to_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let existing = write_file(dir.path(), "out.xyz", "keep me");
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();
    let exporter =
        XyzExporter::from_options(&options(&[("columns", json!(["Position.X"]))])).unwrap();

    let err = ExportService::new(&dataset)
        .export_to(Arc::new(exporter), &[node], &Location::local(&existing), false)
        .unwrap_err();

    assert!(matches!(err, Error::ExportFailed(_)));
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep me");
}

#[test]
fn test_export_to_remote_location_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &OptionMap::new())
        .unwrap();
    let exporter =
        XyzExporter::from_options(&options(&[("columns", json!(["Position.X"]))])).unwrap();
    let remote = Location::parse("sftp://host/data/out.xyz").unwrap();

    let err = ExportService::new(&dataset)
        .export_to(Arc::new(exporter), &[node], &remote, true)
        .unwrap_err();

    assert!(matches!(err, Error::ExportFailed(_)));
}

#[test]
fn test_missing_file_is_import_failure() {
    let dataset = DataSet::new().unwrap();

    let err = ImportService::new(&dataset)
        .import_file("/nonexistent/atomio/x.xyz", &OptionMap::new())
        .unwrap_err();

    assert!(matches!(err, Error::ImportFailed(ref m) if m.contains("x.xyz")), "{err}");
    assert!(dataset.scene().is_empty());
}

#[tokio::test]
async fn test_import_inside_async_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();

    let node = ImportService::new(&dataset)
        .import_file(path.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();

    assert_eq!(node.source().data(0).unwrap().particle_count(), 3);
}

#[test]
fn test_replace_selected_same_format_keeps_columns() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let second = write_file(dir.path(), "b.xyz", XYZ_SINGLE);
    let dataset = DataSet::new().unwrap();
    let service = ImportService::new(&dataset);

    let node = service
        .import_file(first.to_str().unwrap(), &options(&[("columns", id_columns())]))
        .unwrap();
    let importer = node.source().importer().unwrap();
    let replaced = service
        .import_location(&Location::local(&second), &OptionMap::new(), ImportMode::ReplaceSelected)
        .unwrap();

    assert_eq!(node.id(), replaced.id());
    let reused = replaced.source().importer().unwrap();
    assert!(reused.ptr_eq(&importer));
    assert_eq!(reused.options().unwrap()["columns"], id_columns());
    let data = replaced.source().data(0).unwrap();
    assert_eq!(data.column_value(2, "Particle Identifier"), Some(3.0));
}

#[test]
fn test_export_waits_for_unevaluated_node() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "a.xyz", XYZ_SINGLE);
    let output = dir.path().join("out.xyz");
    let dataset = DataSet::new().unwrap();
    let importer = dataset.formats().create_importer("xyz").unwrap();
    importer.bind(&options(&[("columns", id_columns())])).unwrap();
    let source = FileSource::new(dataset.source_context());
    source.set_source(Location::local(&input), Some(importer)).unwrap();
    let node = ObjectNode::new("a.xyz", source);

    ExportService::new(&dataset)
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Particle Identifier", "Position.X"]))]),
        )
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("3\n"), "{written}");
    assert!(written.contains("2 0.757\n"), "{written}");
}

#[test]
fn test_export_loads_frame_for_current_time() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "traj.xyz", XYZ_TWO_FRAMES);
    let output = dir.path().join("out.xyz");
    let dataset = DataSet::new().unwrap();
    let node = ImportService::new(&dataset)
        .import_file(input.to_str().unwrap(), &options(&[("multiple_frames", json!(true))]))
        .unwrap();
    assert_eq!(node.source().loaded_frame(), Some(0));

    dataset.set_current_time(1);
    ExportService::new(&dataset)
        .export_file(
            &[Arc::clone(&node)],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Position.X"]))]),
        )
        .unwrap();

    assert_eq!(node.source().loaded_frame(), Some(1));
    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.ends_with("0.5\n1.5\n"), "{written}");
}

#[test]
fn test_export_canceled_while_evaluating() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "never.slow", "SLOW\n");
    let output = dir.path().join("out.xyz");
    let dataset = dataset_with_slow_format();
    let source = FileSource::new(dataset.source_context());
    source.set_source(Location::local(&input), None).unwrap();
    let node = ObjectNode::new("never.slow", source);
    let canceler = cancel_when_running(dataset.task_manager());

    let err = ExportService::new(&dataset)
        .export_file(
            &[node],
            output.to_str().unwrap(),
            "xyz",
            &options(&[("columns", json!(["Position.X"]))]),
        )
        .unwrap_err();

    assert!(canceler.join().unwrap());
    assert!(matches!(err, Error::Canceled));
    assert!(!output.exists());
}

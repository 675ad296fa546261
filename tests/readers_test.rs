use hira_analysis::domain::model::{DataContent, ParamValue};
use hira_analysis::io::{read_dataset, read_qudi_parameters, save_table, DataFormat};
use hira_analysis::AnalysisError;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

#[test]
fn test_read_confocal_image() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "confocal.dat",
        "#X image min (m):0\n\
#X image max (m):2e-06\n\
#Y image min:0\n\
#Y image max:1e-06\n\
#=====\n\
1 2\n\
3 4\n\
5 6\n",
    );

    let dataset = read_dataset(&path, DataFormat::Confocal, "scan").unwrap();
    let DataContent::Grid(grid) = dataset.content else {
        panic!("expected a grid");
    };
    assert_eq!(grid.x, vec![2e-6, 1e-6, 0.0]);
    assert_eq!(grid.y, vec![0.0, 1e-6]);
    assert_eq!(grid.values[(0, 0)], 5.0);
    assert_eq!(grid.values[(2, 1)], 2.0);
    assert_eq!(dataset.parameters.get_f64("X image max (m)"), Some(2e-6));
}

#[test]
fn test_confocal_without_axes_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bare.dat", "#=====\n1 2\n3 4\n");
    let err = read_dataset(&path, DataFormat::Confocal, "bare").unwrap_err();
    assert!(matches!(err, AnalysisError::MissingParameter { .. }), "{}", err);
}

#[test]
fn test_qudi_parameters_append_extension() {
    let dir = TempDir::new().unwrap();
    write(&dir, "odmr.dat", "#mw power (dBm):-30\n#averages:12\n#=====\n");

    let stem = dir.path().join("odmr").display().to_string();
    let params = read_qudi_parameters(&stem).unwrap();
    assert_eq!(params.get_f64("mw power (dBm)"), Some(-30.0));
    assert_eq!(params.get("averages"), Some(&ParamValue::Int(12)));
}

#[test]
fn test_read_instrument_logs() {
    let dir = TempDir::new().unwrap();
    let pfeiffer = write(
        &dir,
        "pressure.txt",
        "PV TurboViewer export\n\
Date\tTime\tCH 1\tCH 2\tCH 3\n\
unit\tunit\tmbar\tmbar\tmbar\n\
\n\
----\n\
24.06.2022\t09:20:15\t1.2E-9\t3.0E-7\t4.1E-3\n",
    );
    let dataset = read_dataset(&pfeiffer, DataFormat::Pfeiffer, "pressure").unwrap();
    let DataContent::Table(table) = dataset.content else {
        panic!("expected a table");
    };
    assert_eq!(table.column_names(), vec!["Datetime", "CH 1", "CH 2", "CH 3"]);

    let lakeshore = write(
        &dir,
        "temperature.xls",
        "Lakeshore Model 336\n\
Start\tJun 24, 2022 09:20:15 CET\n\
\n\
Time\tChannel A (K)\n\
0\t4.21\n\
1000\t4.22\n",
    );
    let dataset = read_dataset(&lakeshore, DataFormat::Lakeshore, "temperature").unwrap();
    let DataContent::Table(table) = dataset.content else {
        panic!("expected a table");
    };
    assert_eq!(table.floats("Channel A (K)").unwrap(), &[4.21, 4.22]);
    assert!(table.column("Datetime").unwrap().as_timestamps().is_some());

    let err = read_dataset(&lakeshore, DataFormat::Pfeiffer, "wrong").unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidExtension { .. }));
}

#[test]
fn test_read_nanonis_and_save_table() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "spectroscopy.dat",
        "Experiment\tbias spectroscopy\t\n\
Oscillation Control>Amplitude Setpoint (m)\t1E-10\t\n\
\n\
[DATA]\n\
Bias (V)\tCurrent (A)\t\n\
-1.0\t2.5E-12\t\n\
1.0\t-2.5E-12\t\n",
    );
    let dataset = read_dataset(&path, DataFormat::Nanonis, "iv").unwrap();
    assert_eq!(dataset.parameters.get_f64("Amplitude Setpoint (m)"), Some(1e-10));
    let DataContent::Table(table) = dataset.content else {
        panic!("expected a table");
    };

    let saved = save_table(&table, dir.path().join("out/iv")).unwrap();
    let content = fs::read_to_string(saved).unwrap();
    assert_eq!(content, "Bias (V)\tCurrent (A)\n-1\t0.0000000000025\n1\t-0.0000000000025\n");
}

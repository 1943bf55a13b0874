use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;
use std::f64::consts::PI;

#[derive(Deserialize)]
struct FeaturesOutput {
    n_peaks: f64,
    hr_mean: Option<f64>,
    rmssd: Option<f64>,
    dc: f64,
}

#[derive(Deserialize)]
struct SqiOutput {
    sqi_db: f64,
    accepted: bool,
}

fn pulse_text(n: usize, period: usize) -> String {
    (0..n)
        .map(|i| {
            let phase = (i % period) as f64 - period as f64 / 2.0;
            format!("{}\n", (-phase * phase / 8.0).exp())
        })
        .collect()
}

#[test]
fn features_from_stdin() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ppgfeat");
    cmd.args(["features", "--fs", "25"]).write_stdin(pulse_text(250, 20));
    let out = cmd.assert().success().get_output().stdout.clone();
    let features: FeaturesOutput = serde_json::from_slice(&out)?;
    assert_eq!(features.n_peaks, 12.0);
    assert!((features.hr_mean.expect("defined") - 75.0).abs() < 1e-9);
    assert!(features.rmssd.expect("defined").abs() < 1e-9);
    assert!(features.dc > 0.0);
    Ok(())
}

#[test]
fn flat_window_reports_nulls() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("ppgfeat");
    cmd.args(["features"]).write_stdin("0\n".repeat(250));
    let out = cmd.assert().success().get_output().stdout.clone();
    let features: FeaturesOutput = serde_json::from_slice(&out)?;
    assert_eq!(features.n_peaks, 0.0);
    assert!(features.hr_mean.is_none());
    assert!(features.rmssd.is_none());
    Ok(())
}

#[test]
fn sqi_of_clean_pulse_passes() -> Result<(), Box<dyn Error>> {
    let text: String = (0..750)
        .map(|i| format!("{}\n", (2.0 * PI * 1.2 * i as f64 / 25.0).sin()))
        .collect();
    let mut cmd = cargo_bin_cmd!("ppgfeat");
    cmd.args(["sqi", "--fs", "25"]).write_stdin(text);
    let out = cmd.assert().success().get_output().stdout.clone();
    let sqi: SqiOutput = serde_json::from_slice(&out)?;
    assert!(sqi.sqi_db > 20.0);
    assert!(sqi.accepted);
    Ok(())
}

#[test]
fn sqi_rejects_short_input() {
    let mut cmd = cargo_bin_cmd!("ppgfeat");
    cmd.args(["sqi"]).write_stdin("1\n2\n3\n");
    cmd.assert().failure();
}

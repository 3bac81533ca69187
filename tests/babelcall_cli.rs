use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn babelcall_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_babelcall").expect("babelcall test binary not built")
}

#[test]
fn help_mentions_translated_captions() {
    let output = Command::new(babelcall_bin())
        .arg("--help")
        .output()
        .expect("run babelcall --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("translated captions"));
    assert!(combined.contains("--broker"));
}

#[test]
fn list_input_devices_prints_message() {
    let output = Command::new(babelcall_bin())
        .arg("--list-input-devices")
        .env("BABELCALL_TEST_DEVICES", "Stub Mic")
        .output()
        .expect("run babelcall --list-input-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("Available audio input devices:"));
    assert!(combined.contains("Stub Mic"));
}

#[test]
fn rejects_invalid_broker_address() {
    let output = Command::new(babelcall_bin())
        .args(["--broker", "not-an-address"])
        .output()
        .expect("run babelcall with bad broker");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--broker"));
}
